mod auth_tests;
mod session_tests;
mod transport_tests;
