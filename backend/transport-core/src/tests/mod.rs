mod auth;
mod duration;
mod errors;
mod machine;
mod reconnection;
mod state;
