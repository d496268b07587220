pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;

pub mod crypto {
    pub mod aes;
    pub mod key_store;
    pub mod token;
}

pub mod models {
    pub mod session_record;
    pub mod subject;
}

pub mod repositories {
    pub mod session_record;
}

pub mod services {
    pub mod identity;
    pub mod wechat;
}

pub mod handlers {
    pub mod auth;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

pub mod validation {
    pub mod auth;
}
