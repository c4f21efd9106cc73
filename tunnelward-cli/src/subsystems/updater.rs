//! Periodic release check.
//!
//! The update URL answers with the latest version, either as plain text or
//! as `{"version": "..."}`. Installing it is left to the operator.

use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use tunnelward_common::{format_duration, SubsystemError};
use tunnelward_core::SubsystemContext;

#[derive(serde::Deserialize)]
struct Release {
    version: String,
}

pub async fn run(
    url: String,
    freq: Duration,
    client: reqwest::Client,
    ctx: SubsystemContext,
) -> Result<(), SubsystemError> {
    info!(
        "Checking {} for updates every {}",
        url,
        format_duration(freq)
    );

    let mut interval = tokio::time::interval(freq);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = ctx.shutdown.cancelled() => return Ok(()),
            _ = interval.tick() => {}
        }

        match latest_version(&client, &url).await {
            Ok(latest) if is_newer(&latest, ctx.version) => info!(
                "Version {} is available (running {})",
                latest, ctx.version
            ),
            Ok(latest) => debug!("Running {}, latest is {}", ctx.version, latest),
            Err(e) => warn!("Update check against {} failed: {}", url, e),
        }
    }
}

async fn latest_version(client: &reqwest::Client, url: &str) -> Result<String, reqwest::Error> {
    let body = client
        .get(url)
        .send()
        .await?
        .error_for_status()?
        .text()
        .await?;
    Ok(parse_release(&body))
}

fn parse_release(body: &str) -> String {
    match serde_json::from_str::<Release>(body) {
        Ok(release) => release.version,
        Err(_) => body.trim().to_string(),
    }
}

/// Semver comparison; anything unparsable never counts as newer.
pub fn is_newer(latest: &str, current: &str) -> bool {
    match (parse_version(latest), parse_version(current)) {
        (Ok(latest), Ok(current)) => latest > current,
        _ => false,
    }
}

fn parse_version(version: &str) -> Result<semver::Version, semver::Error> {
    let version = version.trim();
    semver::Version::parse(version.strip_prefix('v').unwrap_or(version))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{routing::get, Router};
    use tokio::net::TcpListener;
    use tunnelward_core::Supervisor;

    #[test]
    fn test_is_newer() {
        assert!(is_newer("0.5.0", "0.4.0"));
        assert!(is_newer("v1.0.0", "0.9.9"));
        assert!(is_newer("0.4.1", "0.4.0"));
        assert!(!is_newer("0.4.0", "0.4.0"));
        assert!(!is_newer("0.3.9", "0.4.0"));
        assert!(!is_newer("latest", "0.4.0"));
        assert!(!is_newer("0.5", "0.4.0"));
        assert!(is_newer("0.5.0-rc1", "0.4.0"));
    }

    #[test]
    fn test_final_release_beats_prerelease() {
        assert!(is_newer("0.4.0", "0.4.0-rc1"));
        assert!(is_newer("0.4.0-rc2", "0.4.0-rc1"));
        assert!(!is_newer("0.4.0-rc1", "0.4.0"));
    }

    #[test]
    fn test_parse_release() {
        assert_eq!(parse_release("0.5.0\n"), "0.5.0");
        assert_eq!(parse_release(r#"{"version":"1.2.3"}"#), "1.2.3");
    }

    #[tokio::test]
    async fn test_stops_on_cancel() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/", get(|| async { "99.0.0" }));
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });

        let supervisor = Supervisor::new(Duration::ZERO);
        let ctx = supervisor.context();
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let task = tokio::spawn(run(
            format!("http://{addr}/"),
            Duration::from_millis(10),
            client,
            ctx,
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        supervisor
            .trigger_handle()
            .trigger(tunnelward_core::TriggerSource::Requested);
        supervisor.wait_to_shutdown().await;
        assert!(task.await.unwrap().is_ok());
    }
}
