//! Deprecation and sunset policy.
//!
//! "Deprecated" is a permanent fact about a binding. "Expired" depends on the
//! clock: it holds once the sunset timestamp has been reached. Whether an
//! expired version is still served is left to [`PastSunsetAction`].

use crate::table::RouteBinding;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deprecation annotations for one binding at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeprecationInfo {
    pub deprecated: bool,
    pub sunset: Option<DateTime<Utc>>,
    pub expired: bool,
}

impl DeprecationInfo {
    /// Days left until sunset (negative once past), if a sunset is set.
    pub fn days_until_sunset(&self, now: DateTime<Utc>) -> Option<i64> {
        self.sunset.map(|sunset| (sunset - now).num_days())
    }
}

/// Compute the deprecation annotations of `binding` at `now`.
pub fn annotate<H>(binding: &RouteBinding<H>, now: DateTime<Utc>) -> DeprecationInfo {
    let sunset = binding.sunset_at();
    DeprecationInfo {
        deprecated: binding.is_deprecated(),
        sunset,
        expired: sunset.map(|sunset| now >= sunset).unwrap_or(false),
    }
}

/// What to do with a request whose binding is past its sunset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PastSunsetAction {
    /// Serve the request with deprecation headers (default)
    #[default]
    Warn,
    /// Refuse with 410 Gone
    Reject,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{BindingOptions, RouteTableBuilder, VersioningOptions};
    use crate::version::ApiVersion;
    use chrono::{Duration, TimeZone};
    use http::Method;

    fn sunset() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 6, 1, 0, 0, 0).unwrap()
    }

    fn table() -> crate::table::RouteTable<()> {
        let opts = VersioningOptions::default();
        let mut builder = RouteTableBuilder::new(&opts);
        builder
            .register_with(
                "/v{version}/stuff",
                Method::GET,
                ApiVersion::new(1, 0),
                (),
                BindingOptions::deprecated().with_sunset(sunset()),
            )
            .unwrap()
            .register_with(
                "/v{version}/stuff",
                Method::GET,
                ApiVersion::new(2, 0),
                (),
                BindingOptions::deprecated(),
            )
            .unwrap()
            .register("/v{version}/stuff", Method::GET, ApiVersion::new(3, 0), ())
            .unwrap();
        builder.build()
    }

    #[test]
    fn test_expired_at_sunset_boundary() {
        let table = table();
        let binding = table
            .lookup("/v{version}/stuff", &Method::GET, ApiVersion::new(1, 0))
            .unwrap();

        let at = annotate(binding, sunset());
        assert!(at.deprecated);
        assert_eq!(at.sunset, Some(sunset()));
        assert!(at.expired);

        let before = annotate(binding, sunset() - Duration::seconds(1));
        assert!(before.deprecated);
        assert!(!before.expired);
    }

    #[test]
    fn test_deprecated_without_sunset_never_expires() {
        let table = table();
        let binding = table
            .lookup("/v{version}/stuff", &Method::GET, ApiVersion::new(2, 0))
            .unwrap();
        let info = annotate(binding, sunset() + Duration::days(3650));
        assert!(info.deprecated);
        assert_eq!(info.sunset, None);
        assert!(!info.expired);
        assert_eq!(info.days_until_sunset(sunset()), None);
    }

    #[test]
    fn test_current_version() {
        let table = table();
        let binding = table
            .lookup("/v{version}/stuff", &Method::GET, ApiVersion::new(3, 0))
            .unwrap();
        assert_eq!(
            annotate(binding, sunset()),
            DeprecationInfo {
                deprecated: false,
                sunset: None,
                expired: false,
            }
        );
    }

    #[test]
    fn test_days_until_sunset() {
        let info = DeprecationInfo {
            deprecated: true,
            sunset: Some(sunset()),
            expired: false,
        };
        assert_eq!(info.days_until_sunset(sunset() - Duration::days(30)), Some(30));
        assert_eq!(info.days_until_sunset(sunset() + Duration::days(2)), Some(-2));
    }

    #[test]
    fn test_past_sunset_action_yaml() {
        let action: PastSunsetAction = serde_yaml::from_str("reject").unwrap();
        assert_eq!(action, PastSunsetAction::Reject);
        assert_eq!(PastSunsetAction::default(), PastSunsetAction::Warn);
    }
}
