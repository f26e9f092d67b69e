mod helpers;
mod lifecycle;
mod reconnect;
