/// The subject id recovered from a request's token.
///
/// Inserted into request extensions by `require_token`; handlers behind that
/// middleware take it with `Extension<Subject>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject(pub String);

impl Subject {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
