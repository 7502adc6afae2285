mod runtime;
mod support;

mod test_config;
mod test_per_client_dispatcher;
