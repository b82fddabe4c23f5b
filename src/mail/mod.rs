pub mod decoders;
pub mod gmail_client;
pub mod inbox;
pub mod mailbox;
pub mod payload;
