pub mod credentials;
pub mod oauth;
pub mod password;
pub mod token_manager;
