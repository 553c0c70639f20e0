mod helpers;

mod correlation_test;
mod lookup_handler_test;
