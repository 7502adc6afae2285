use crate::{DispatcherError, KeyPrefix, RouteLimit};

/// The two counters touched by one admission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterKeys {
    /// Counter of `(route, method, client)`.
    pub route: String,
    /// Counter of `client` across every route.
    pub global: String,
}

impl CounterKeys {
    /// Keys in the order the store procedures expect them.
    pub fn as_slice(&self) -> [&str; 2] {
        [&self.route, &self.global]
    }
}

/// Builds counter keys under a common prefix.
///
/// The client identity is wrapped in a Redis Cluster hash tag so that the route
/// and global counters of one client always live on the same slot, which
/// multi-key scripts require:
///
/// - global: `<prefix>:{<client>}:global`
/// - route: `<prefix>:{<client>}:route:<METHOD>:<path>`
#[derive(Debug, Clone)]
pub(crate) struct CounterKeyGenerator {
    prefix: KeyPrefix,
}

impl CounterKeyGenerator {
    pub(crate) fn new(prefix: KeyPrefix) -> Self {
        Self { prefix }
    }

    pub(crate) fn prefix(&self) -> &KeyPrefix {
        &self.prefix
    }

    pub(crate) fn global_key(&self, client: &str) -> String {
        format!("{}:{{{}}}:global", &*self.prefix, client)
    }

    pub(crate) fn route_key(&self, client: &str, route: &RouteLimit) -> String {
        format!(
            "{}:{{{}}}:route:{}:{}",
            &*self.prefix,
            client,
            route.method(),
            route.path()
        )
    }

    pub(crate) fn keys(
        &self,
        client: &str,
        route: &RouteLimit,
    ) -> Result<CounterKeys, DispatcherError> {
        if client.is_empty() {
            return Err(DispatcherError::InvalidKey(
                "Client identity must not be empty".to_string(),
            ));
        }
        // A closing brace would end the hash tag early and split the two keys
        // across slots.
        if client.contains('}') {
            return Err(DispatcherError::InvalidKey(
                "Client identity must not contain '}'".to_string(),
            ));
        }

        Ok(CounterKeys {
            route: self.route_key(client, route),
            global: self.global_key(client),
        })
    }
}
