mod commands;
mod logger;
mod render;
