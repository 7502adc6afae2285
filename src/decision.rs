use http::{HeaderMap, HeaderName, HeaderValue, StatusCode};

use crate::{Precedence, window};

/// Header carrying the configured global limit.
pub const LIMIT_GLOBAL_HEADER: &str = "x-ratelimit-limit-global";
/// Header carrying the remaining global quota.
pub const REMAINING_GLOBAL_HEADER: &str = "x-ratelimit-remaining-global";
/// Header carrying the global window reset time.
pub const RESET_GLOBAL_HEADER: &str = "x-ratelimit-reset-global";
/// Header carrying the configured route limit.
pub const LIMIT_ROUTE_HEADER: &str = "x-ratelimit-limit-route";
/// Header carrying the remaining route quota.
pub const REMAINING_ROUTE_HEADER: &str = "x-ratelimit-remaining-route";
/// Header carrying the route window reset time.
pub const RESET_ROUTE_HEADER: &str = "x-ratelimit-reset-route";

/// Quota left in a window after accounting for the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Remaining {
    /// The request fit; this many more fit in the same window.
    Available(u64),
    /// The request did not fit.
    Exceeded,
}

impl Remaining {
    /// Whether the scope is exhausted.
    pub fn is_exceeded(&self) -> bool {
        matches!(self, Self::Exceeded)
    }

    /// Remaining quota, with an exhausted scope counted as 0.
    pub fn saturating(&self) -> u64 {
        match self {
            Self::Available(remaining) => *remaining,
            Self::Exceeded => 0,
        }
    }
}

impl From<Option<u64>> for Remaining {
    fn from(value: Option<u64>) -> Self {
        value.map_or(Self::Exceeded, Self::Available)
    }
}

/// State of one scope (global or route) after a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeStatus {
    /// Configured limit of the scope.
    pub limit: u64,
    /// What is left in the current window.
    pub remaining: Remaining,
    /// Unix seconds at which the current window ends.
    pub reset_at: i64,
}

impl ScopeStatus {
    /// Whether this scope rejected the request.
    pub fn is_exceeded(&self) -> bool {
        self.remaining.is_exceeded()
    }

    /// [`ScopeStatus::reset_at`] formatted as `YYYY-MM-DD HH:MM:SS` local time.
    pub fn reset_at_string(&self) -> String {
        window::format_reset_time(self.reset_at)
    }
}

/// Which scope a rejection is reported for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RejectionKind {
    /// The client used up its quota across all routes.
    GlobalLimitExceeded,
    /// The client used up its quota on this route.
    RouteLimitExceeded,
}

/// The rejection an entry point should surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rejection {
    /// Scope reported to the client.
    pub kind: RejectionKind,
    /// Unix seconds at which that scope's window ends.
    pub reset_at: i64,
}

impl Rejection {
    /// Always `429 Too Many Requests`.
    pub fn status(&self) -> StatusCode {
        StatusCode::TOO_MANY_REQUESTS
    }

    /// Response body: the reset time of the rejecting scope.
    pub fn body(&self) -> String {
        window::format_reset_time(self.reset_at)
    }
}

/// Outcome of one admission check.
///
/// Both scopes are always evaluated and reported; [`Decision::rejection`]
/// applies the configured [`Precedence`] when both are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    /// Global (per-client) scope.
    pub global: ScopeStatus,
    /// Route (per-client, per-route) scope.
    pub route: ScopeStatus,
    /// Tie-break used by [`Decision::rejection`].
    pub precedence: Precedence,
}

impl Decision {
    /// Whether the request may proceed.
    pub fn is_allowed(&self) -> bool {
        !self.global.is_exceeded() && !self.route.is_exceeded()
    }

    /// Whether the global scope is exhausted.
    pub fn global_exceeded(&self) -> bool {
        self.global.is_exceeded()
    }

    /// Whether the route scope is exhausted.
    pub fn route_exceeded(&self) -> bool {
        self.route.is_exceeded()
    }

    /// The rejection to surface, or `None` if the request is admitted.
    pub fn rejection(&self) -> Option<Rejection> {
        let global = self.global.is_exceeded().then_some(Rejection {
            kind: RejectionKind::GlobalLimitExceeded,
            reset_at: self.global.reset_at,
        });
        let route = self.route.is_exceeded().then_some(Rejection {
            kind: RejectionKind::RouteLimitExceeded,
            reset_at: self.route.reset_at,
        });

        match self.precedence {
            Precedence::GlobalFirst => global.or(route),
            Precedence::RouteFirst => route.or(global),
        }
    }

    /// Rate-status headers for the response.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::with_capacity(6);
        self.write_headers(&mut headers);
        headers
    }

    /// Insert the rate-status headers into `headers`, replacing earlier values.
    pub fn write_headers(&self, headers: &mut HeaderMap) {
        let entries = [
            (LIMIT_GLOBAL_HEADER, self.global.limit.to_string()),
            (
                REMAINING_GLOBAL_HEADER,
                self.global.remaining.saturating().to_string(),
            ),
            (RESET_GLOBAL_HEADER, self.global.reset_at_string()),
            (LIMIT_ROUTE_HEADER, self.route.limit.to_string()),
            (
                REMAINING_ROUTE_HEADER,
                self.route.remaining.saturating().to_string(),
            ),
            (RESET_ROUTE_HEADER, self.route.reset_at_string()),
        ];

        for (name, value) in entries {
            // Digits, dashes, colons and spaces only; always a valid value.
            if let Ok(value) = HeaderValue::try_from(value) {
                headers.insert(HeaderName::from_static(name), value);
            }
        }
    }
}
