use crate::common::{
    constants::CHART_NAME,
    error::{NotAKnownHelmChart, RegexCompile, Result, RollbackForbidden, SemverParse},
};
use regex::Regex;
use semver::Version;
use snafu::{ensure, OptionExt, ResultExt};
use tracing::info;

/// Generate a semver::Version from the '<chart-name>-<chart-version>' string of an installed
/// helm release.
pub(crate) fn version_from_release_chart(chart: &str) -> Result<Version> {
    // The chart name followed by a '-' and a semver, which may carry a pre-release part,
    // e.g. nginx-service-mesh-1.7.0, nginx-service-mesh-1.7.0-rc.1.
    let chart_regex =
        format!(r"^{CHART_NAME}-([0-9]+\.[0-9]+\.[0-9]+(-[a-zA-Z0-9]+(\.[0-9]+)?)*)$");

    let captures = Regex::new(chart_regex.as_str())
        .context(RegexCompile {
            expression: chart_regex.clone(),
        })?
        .captures(chart)
        .context(NotAKnownHelmChart {
            chart: chart.to_string(),
        })?;

    let version = captures
        .get(1)
        .map(|m| m.as_str())
        .context(NotAKnownHelmChart {
            chart: chart.to_string(),
        })?;

    Version::parse(version).context(SemverParse {
        version_string: version.to_string(),
    })
}

/// Validates the upgrade path from 'from' Version to 'to' Version. Going back to an older
/// version is not an upgrade.
pub(crate) fn validate_upgrade_path(from: &Version, to: &Version, skip: bool) -> Result<()> {
    if skip {
        info!(%from, %to, "Skipping upgrade path validation");
        return Ok(());
    }

    ensure!(
        to.ge(from),
        RollbackForbidden {
            from_version: from.to_string(),
            to_version: to.to_string()
        }
    );

    if to.eq(from) {
        info!(version = %to, "Installed chart version is the same as the target chart version");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{validate_upgrade_path, version_from_release_chart};
    use crate::common::error::Error;
    use semver::Version;

    #[test]
    fn chart_string_yields_version() {
        assert_eq!(
            version_from_release_chart("nginx-service-mesh-1.6.0").unwrap(),
            Version::new(1, 6, 0)
        );
        assert_eq!(
            version_from_release_chart("nginx-service-mesh-1.7.0-rc.1").unwrap(),
            Version::parse("1.7.0-rc.1").unwrap()
        );
    }

    #[test]
    fn foreign_chart_is_rejected() {
        assert!(matches!(
            version_from_release_chart("nginx-ingress-1.0.0"),
            Err(Error::NotAKnownHelmChart { .. })
        ));
        assert!(matches!(
            version_from_release_chart("nginx-service-mesh"),
            Err(Error::NotAKnownHelmChart { .. })
        ));
    }

    #[test]
    fn rollback_is_forbidden_unless_skipped() {
        let older = Version::new(1, 6, 0);
        let newer = Version::new(1, 7, 0);

        assert!(validate_upgrade_path(&older, &newer, false).is_ok());
        assert!(validate_upgrade_path(&newer, &newer, false).is_ok());
        assert!(matches!(
            validate_upgrade_path(&newer, &older, false),
            Err(Error::RollbackForbidden { .. })
        ));
        assert!(validate_upgrade_path(&newer, &older, true).is_ok());
    }
}
