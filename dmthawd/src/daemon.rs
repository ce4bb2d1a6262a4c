//! Cycle orchestration and the fixed-interval control loop.
//!
//! Each cycle probes the target daemon (when a probe is configured), scans
//! for suspended devices, feeds the sighting through the debounce, resumes
//! whatever became actionable, and sends one combined notification for the
//! cycle. The loop then sleeps for the configured interval. Shutdown is
//! taken between cycles only, so an in-flight cycle always completes.

use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DaemonConfig;
use crate::dm::{name, ResumeExecutor, VolumeScanner};
use crate::health::{HealthProbe, ProbeOutcome};
use crate::notify::{local_hostname, Notifier};
use crate::report::{self, CycleOutcome};
use crate::tracker::SuspicionTracker;

pub struct Daemon {
    config: DaemonConfig,
    scanner: Box<dyn VolumeScanner>,
    resumer: Box<dyn ResumeExecutor>,
    notifier: Box<dyn Notifier>,
    probe: Option<HealthProbe>,
    tracker: SuspicionTracker,
    hostname: String,
}

impl Daemon {
    pub fn new(
        config: DaemonConfig,
        scanner: Box<dyn VolumeScanner>,
        resumer: Box<dyn ResumeExecutor>,
        notifier: Box<dyn Notifier>,
        probe: Option<HealthProbe>,
    ) -> Self {
        Self {
            config,
            scanner,
            resumer,
            notifier,
            probe,
            tracker: SuspicionTracker::new(),
            hostname: local_hostname(),
        }
    }

    /// Runs cycles until the token is cancelled.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!(
            interval = ?self.config.interval,
            health_probe = self.probe.is_some(),
            "remediation loop started"
        );
        loop {
            self.run_cycle().await;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = time::sleep(self.config.interval) => {}
            }
        }
        info!("remediation loop stopped");
    }

    async fn run_cycle(&mut self) {
        self.check_health().await;
        self.remediate().await;
    }

    async fn check_health(&self) {
        let Some(probe) = &self.probe else { return };
        match probe.run().await {
            Ok(ProbeOutcome::Passed { .. }) => debug!("health check passed"),
            Ok(ProbeOutcome::Failed { code, output }) => {
                warn!(command = probe.command(), ?code, "health check failed");
                let mut body = match code {
                    Some(code) => format!(
                        "Liveness command `{}` exited with status {code}.",
                        probe.command()
                    ),
                    None => format!(
                        "Liveness command `{}` was killed by a signal.",
                        probe.command()
                    ),
                };
                if !output.is_empty() {
                    body.push_str("\n\n");
                    body.push_str(&output);
                    body.push('\n');
                }
                let subject = format!("Health check failed on {}", self.hostname);
                self.notify(&subject, &body).await;
            }
            Ok(ProbeOutcome::TimedOut) => {
                warn!(
                    command = probe.command(),
                    timeout = ?probe.timeout(),
                    "health check timed out"
                );
                let body = format!(
                    "Liveness command `{}` did not finish within {:?} and was killed.",
                    probe.command(),
                    probe.timeout()
                );
                let subject = format!("Health check timed out on {}", self.hostname);
                self.notify(&subject, &body).await;
            }
            Err(error) => {
                warn!(command = probe.command(), error = %error, "health check could not run");
            }
        }
    }

    async fn remediate(&mut self) {
        let suspended = match self.scanner.scan().await {
            Ok(suspended) => suspended,
            Err(error) => {
                warn!(error = %error, "scan failed, leaving tracked devices untouched");
                return;
            }
        };
        debug!(count = suspended.len(), devices = ?suspended, "scan complete");
        let mut actionable = self.tracker.observe(&suspended);
        if !self.tracker.is_empty() {
            let armed: Vec<&str> = self.tracker.tracked().collect();
            debug!(armed = ?armed, "devices awaiting a confirming sighting");
        }
        if actionable.is_empty() {
            return;
        }
        sort_longest_first(&mut actionable);

        let mut outcome = CycleOutcome::default();
        for device in &actionable {
            match self.resumer.resume(device).await {
                Ok(true) => {
                    info!(device = %device, "resumed suspended device");
                    outcome.resumed.push(display(device));
                }
                Ok(false) => {
                    warn!(device = %device, "resume failed, will retry on next sighting");
                    outcome.failed.push(display(device));
                    self.tracker.track(device.clone());
                }
                Err(error) => {
                    warn!(device = %device, error = %error, "resume could not run, will retry on next sighting");
                    self.tracker.track(device.clone());
                }
            }
        }
        if outcome.is_empty() {
            return;
        }
        let subject = format!("Suspended volumes on {}", self.hostname);
        self.notify(&subject, &report::build(&outcome)).await;
    }

    async fn notify(&self, subject: &str, body: &str) {
        if let Err(error) = self.notifier.send(subject, body).await {
            warn!(subject = %subject, error = %error, "notification delivery failed");
        }
    }
}

/// Longest names first, so the hidden `-real`/`-cow` companion devices come
/// back before the volumes stacked on top of them. Ties break alphabetically
/// to keep runs deterministic.
fn sort_longest_first(devices: &mut [String]) {
    devices.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
}

/// Display form for notifications. A name outside the convention is reported
/// raw rather than dropped, so the operator still sees it.
fn display(device: &str) -> String {
    match name::display_name(device) {
        Ok(display) => display,
        Err(error) => {
            warn!(device = %device, error = %error, "device name outside convention, reporting raw name");
            device.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeSet, VecDeque};
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::dm::name::POOL_PREFIX;
    use crate::error::{Error, Result};
    use crate::report::{FAILED_HEADER, RESUMED_HEADER};

    fn vol(n: u8) -> String {
        format!("{POOL_PREFIX}volume--00000000--0000--0000--0000--{n:012x}")
    }

    fn shown(n: u8) -> String {
        format!("volume-00000000-0000-0000-0000-{n:012x}")
    }

    fn set(devices: impl IntoIterator<Item = String>) -> BTreeSet<String> {
        devices.into_iter().collect()
    }

    fn scan_error() -> Error {
        Error::Launch {
            command: "dmsetup info".into(),
            source: io::Error::other("spawn failed"),
        }
    }

    #[derive(Clone, Default)]
    struct ScriptedScanner {
        scans: Arc<Mutex<VecDeque<Result<BTreeSet<String>>>>>,
        calls: Arc<Mutex<usize>>,
    }

    impl ScriptedScanner {
        fn new(scans: Vec<Result<BTreeSet<String>>>) -> Self {
            Self {
                scans: Arc::new(Mutex::new(scans.into())),
                calls: Arc::default(),
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl VolumeScanner for ScriptedScanner {
        async fn scan(&self) -> Result<BTreeSet<String>> {
            *self.calls.lock().unwrap() += 1;
            self.scans
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(BTreeSet::new()))
        }
    }

    #[derive(Clone, Default)]
    struct RecordingResumer {
        refuse: Arc<Mutex<BTreeSet<String>>>,
        broken: Arc<Mutex<BTreeSet<String>>>,
        calls: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingResumer {
        fn refuse(&self, device: &str) {
            self.refuse.lock().unwrap().insert(device.to_string());
        }

        fn allow(&self, device: &str) {
            self.refuse.lock().unwrap().remove(device);
        }

        fn brick(&self, device: &str) {
            self.broken.lock().unwrap().insert(device.to_string());
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResumeExecutor for RecordingResumer {
        async fn resume(&self, device: &str) -> Result<bool> {
            self.calls.lock().unwrap().push(device.to_string());
            if self.broken.lock().unwrap().contains(device) {
                return Err(Error::Launch {
                    command: format!("dmsetup resume {device}"),
                    source: io::Error::other("spawn failed"),
                });
            }
            Ok(!self.refuse.lock().unwrap().contains(device))
        }
    }

    #[derive(Clone)]
    struct RecordingNotifier {
        sent: Arc<Mutex<Vec<(String, String)>>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn new() -> Self {
            Self {
                sent: Arc::default(),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                sent: Arc::default(),
                fail: true,
            }
        }

        fn sent(&self) -> Vec<(String, String)> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, subject: &str, body: &str) -> Result<()> {
            self.sent
                .lock()
                .unwrap()
                .push((subject.to_string(), body.to_string()));
            if self.fail {
                return Err(Error::Io(io::Error::other("delivery refused")));
            }
            Ok(())
        }
    }

    fn daemon(
        scanner: &ScriptedScanner,
        resumer: &RecordingResumer,
        notifier: &RecordingNotifier,
        probe: Option<HealthProbe>,
    ) -> Daemon {
        Daemon::new(
            DaemonConfig::default(),
            Box::new(scanner.clone()),
            Box::new(resumer.clone()),
            Box::new(notifier.clone()),
            probe,
        )
    }

    #[tokio::test]
    async fn first_sighting_takes_no_action() {
        let scanner = ScriptedScanner::new(vec![Ok(set([vol(1)]))]);
        let resumer = RecordingResumer::default();
        let notifier = RecordingNotifier::new();
        let mut daemon = daemon(&scanner, &resumer, &notifier, None);

        daemon.run_cycle().await;

        assert!(resumer.calls().is_empty());
        assert!(notifier.sent().is_empty());
        assert!(daemon.tracker.contains(&vol(1)));
    }

    #[tokio::test]
    async fn confirmed_sighting_resumes_companions_first() {
        let base = vol(1);
        let real = format!("{base}-real");
        let cow = format!("{base}-cow");
        let sighting = set([base.clone(), real.clone(), cow.clone()]);
        let scanner = ScriptedScanner::new(vec![Ok(sighting.clone()), Ok(sighting)]);
        let resumer = RecordingResumer::default();
        let notifier = RecordingNotifier::new();
        let mut daemon = daemon(&scanner, &resumer, &notifier, None);

        daemon.run_cycle().await;
        daemon.run_cycle().await;

        assert_eq!(resumer.calls(), vec![real, cow, base]);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        let (subject, body) = &sent[0];
        assert!(subject.starts_with("Suspended volumes on "));
        assert!(body.contains(RESUMED_HEADER));
        assert!(body.contains(&format!("{}-real", shown(1))));
        assert!(body.contains(&format!("{}-cow", shown(1))));
        assert!(body.contains(&shown(1)));
        assert!(!body.contains(FAILED_HEADER));
        assert!(daemon.tracker.is_empty());
    }

    #[tokio::test]
    async fn failed_resume_is_reported_and_retried_on_next_sighting() {
        let device = vol(2);
        let sighting = set([device.clone()]);
        let scanner = ScriptedScanner::new(vec![
            Ok(sighting.clone()),
            Ok(sighting.clone()),
            Ok(sighting),
        ]);
        let resumer = RecordingResumer::default();
        resumer.refuse(&device);
        let notifier = RecordingNotifier::new();
        let mut daemon = daemon(&scanner, &resumer, &notifier, None);

        daemon.run_cycle().await;
        daemon.run_cycle().await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].1.contains(FAILED_HEADER));
        assert!(sent[0].1.contains(&shown(2)));
        assert!(daemon.tracker.contains(&device));

        // Still suspended on the next sighting, but the command works now.
        resumer.allow(&device);
        daemon.run_cycle().await;

        assert_eq!(resumer.calls().len(), 2);
        let sent = notifier.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[1].1.contains(RESUMED_HEADER));
        assert!(daemon.tracker.is_empty());
    }

    #[tokio::test]
    async fn launch_error_keeps_device_tracked_without_report() {
        let device = vol(3);
        let sighting = set([device.clone()]);
        let scanner = ScriptedScanner::new(vec![Ok(sighting.clone()), Ok(sighting)]);
        let resumer = RecordingResumer::default();
        resumer.brick(&device);
        let notifier = RecordingNotifier::new();
        let mut daemon = daemon(&scanner, &resumer, &notifier, None);

        daemon.run_cycle().await;
        daemon.run_cycle().await;

        assert_eq!(resumer.calls().len(), 1);
        assert!(notifier.sent().is_empty());
        assert!(daemon.tracker.contains(&device));
    }

    #[tokio::test]
    async fn scan_error_skips_cycle_and_preserves_tracking() {
        let device = vol(4);
        let sighting = set([device.clone()]);
        let scanner = ScriptedScanner::new(vec![
            Ok(sighting.clone()),
            Err(scan_error()),
            Ok(sighting),
        ]);
        let resumer = RecordingResumer::default();
        let notifier = RecordingNotifier::new();
        let mut daemon = daemon(&scanner, &resumer, &notifier, None);

        daemon.run_cycle().await;
        daemon.run_cycle().await;
        assert!(resumer.calls().is_empty());
        assert!(daemon.tracker.contains(&device));

        // The sighting after the failed scan is still the confirming one.
        daemon.run_cycle().await;
        assert_eq!(resumer.calls(), vec![device]);
    }

    #[tokio::test]
    async fn mixed_outcome_is_one_combined_report() {
        let good = vol(5);
        let bad = vol(6);
        let sighting = set([good.clone(), bad.clone()]);
        let scanner = ScriptedScanner::new(vec![Ok(sighting.clone()), Ok(sighting)]);
        let resumer = RecordingResumer::default();
        resumer.refuse(&bad);
        let notifier = RecordingNotifier::new();
        let mut daemon = daemon(&scanner, &resumer, &notifier, None);

        daemon.run_cycle().await;
        daemon.run_cycle().await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        let body = &sent[0].1;
        assert!(body.contains(RESUMED_HEADER));
        assert!(body.contains(&shown(5)));
        assert!(body.contains(FAILED_HEADER));
        assert!(body.contains(&shown(6)));
        assert!(!daemon.tracker.contains(&good));
        assert!(daemon.tracker.contains(&bad));
    }

    #[tokio::test]
    async fn quiet_cycles_send_nothing() {
        let scanner = ScriptedScanner::new(vec![]);
        let resumer = RecordingResumer::default();
        let notifier = RecordingNotifier::new();
        let mut daemon = daemon(&scanner, &resumer, &notifier, None);

        daemon.run_cycle().await;
        daemon.run_cycle().await;

        assert!(resumer.calls().is_empty());
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn notification_failure_does_not_rearm_resumed_devices() {
        let device = vol(7);
        let sighting = set([device.clone()]);
        let scanner = ScriptedScanner::new(vec![
            Ok(sighting.clone()),
            Ok(sighting.clone()),
            Ok(sighting),
        ]);
        let resumer = RecordingResumer::default();
        let notifier = RecordingNotifier::failing();
        let mut daemon = daemon(&scanner, &resumer, &notifier, None);

        daemon.run_cycle().await;
        daemon.run_cycle().await;
        assert_eq!(resumer.calls().len(), 1);
        assert!(!daemon.tracker.contains(&device));

        // The resume already happened, so the third sighting starts a fresh
        // debounce instead of acting immediately.
        daemon.run_cycle().await;
        assert_eq!(resumer.calls().len(), 1);
        assert!(daemon.tracker.contains(&device));
    }

    #[tokio::test]
    async fn probe_failure_alerts_and_remediation_continues() {
        let device = vol(8);
        let sighting = set([device.clone()]);
        let scanner = ScriptedScanner::new(vec![Ok(sighting.clone()), Ok(sighting)]);
        let resumer = RecordingResumer::default();
        let notifier = RecordingNotifier::new();
        let probe = HealthProbe::new("echo tgtd gone >&2; exit 3", Duration::from_secs(5));
        let mut daemon = daemon(&scanner, &resumer, &notifier, Some(probe));

        daemon.run_cycle().await;
        daemon.run_cycle().await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent[0].0.contains("Health check failed"));
        assert!(sent[0].1.contains("exited with status 3"));
        assert!(sent[0].1.contains("tgtd gone"));
        assert!(sent[1].0.contains("Health check failed"));
        assert!(sent[2].1.contains(RESUMED_HEADER));
        assert_eq!(resumer.calls(), vec![device]);
    }

    #[tokio::test]
    async fn probe_timeout_alerts_distinctly() {
        let scanner = ScriptedScanner::new(vec![]);
        let resumer = RecordingResumer::default();
        let notifier = RecordingNotifier::new();
        let probe = HealthProbe::new("sleep 30", Duration::from_millis(100));
        let mut daemon = daemon(&scanner, &resumer, &notifier, Some(probe));

        daemon.run_cycle().await;

        let sent = notifier.sent();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].0.contains("timed out"));
        assert!(sent[0].1.contains("was killed"));
    }

    #[tokio::test(start_paused = true)]
    async fn loop_runs_until_cancelled() {
        let scanner = ScriptedScanner::new(vec![]);
        let resumer = RecordingResumer::default();
        let notifier = RecordingNotifier::new();
        let daemon = daemon(&scanner, &resumer, &notifier, None);
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(daemon.run(shutdown.clone()));
        time::sleep(Duration::from_secs(35)).await;
        shutdown.cancel();
        handle.await.unwrap();

        // Cycles at t=0 and after each 10s default interval.
        assert!(scanner.calls() >= 3);
    }

    #[test]
    fn sort_puts_longest_first_and_breaks_ties_alphabetically() {
        let mut devices = vec![
            "bb".to_string(),
            "a".to_string(),
            "ccc".to_string(),
            "aa".to_string(),
        ];
        sort_longest_first(&mut devices);
        assert_eq!(devices, ["ccc", "aa", "bb", "a"]);
    }

    #[test]
    fn unparseable_names_are_reported_raw() {
        assert_eq!(display("weird-device"), "weird-device");
        assert_eq!(display(&vol(9)), shown(9));
    }
}
