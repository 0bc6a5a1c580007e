#![allow(dead_code)]

use async_trait::async_trait;
use pureroot::gate::{DenialRequest, DenialResolution, DenialResolver, GateObserver};
use pureroot::packages::{PackageQuery, PackageState};
use pureroot::system::command::{CommandOutcome, CommandRunner};
use pureroot::{Config, PureRoot, PureRootError, Result};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn outcome(exit_code: i32, stdout: &str, stderr: &str) -> CommandOutcome {
    CommandOutcome {
        exit_code,
        stdout: stdout.to_string(),
        stderr: stderr.to_string(),
    }
}

/// Fake device: a root switch, a `which su` answer and a package table that
/// `pm enable|disable` lines mutate.
#[derive(Default)]
pub struct FakeDevice {
    pub rooted: AtomicBool,
    pub su_on_path: AtomicBool,
    pub root_checks: AtomicUsize,
    pub elevated: Mutex<Vec<String>>,
    pub packages: Mutex<BTreeMap<String, PackageState>>,
    /// When set, `pm` exits 0 without changing anything.
    pub pm_ignores_requests: AtomicBool,
}

impl FakeDevice {
    pub fn new(rooted: bool) -> Arc<Self> {
        let device = Self::default();
        device.rooted.store(rooted, Ordering::SeqCst);
        Arc::new(device)
    }

    pub fn set_rooted(&self, rooted: bool) {
        self.rooted.store(rooted, Ordering::SeqCst);
    }

    pub fn install(&self, name: &str, enabled: bool, system: bool) {
        self.packages.lock().unwrap().insert(
            name.to_string(),
            PackageState {
                package_name: name.to_string(),
                enabled,
                system,
            },
        );
    }

    pub fn root_checks(&self) -> usize {
        self.root_checks.load(Ordering::SeqCst)
    }

    pub fn state_of(&self, name: &str) -> Option<PackageState> {
        self.packages.lock().unwrap().get(name).cloned()
    }
}

#[async_trait]
impl CommandRunner for FakeDevice {
    async fn run_elevated(&self, command_line: &str) -> Result<CommandOutcome> {
        self.elevated.lock().unwrap().push(command_line.to_string());
        if !self.rooted.load(Ordering::SeqCst) {
            return Err(PureRootError::Spawn("su: permission denied".to_string()));
        }

        let mut words = command_line.split_whitespace();
        match (words.next(), words.next(), words.next()) {
            (Some("id"), None, None) => Ok(outcome(0, "uid=0(root) gid=0(root)\n", "")),
            (Some("pm"), Some(action @ ("enable" | "disable")), Some(quoted)) => {
                let name = quoted.trim_matches('\'');
                let mut packages = self.packages.lock().unwrap();
                match packages.get_mut(name) {
                    Some(state) => {
                        if !self.pm_ignores_requests.load(Ordering::SeqCst) {
                            state.enabled = action == "enable";
                        }
                        let word = if action == "enable" { "enabled" } else { "disabled" };
                        Ok(outcome(0, &format!("Package {} new state: {}\n", name, word), ""))
                    }
                    None => Ok(outcome(1, "", &format!("Unknown package: {}\n", name))),
                }
            }
            _ => Ok(outcome(127, "", "sh: not found\n")),
        }
    }

    async fn run_direct(&self, program: &str, args: Vec<String>) -> Result<CommandOutcome> {
        match program {
            "su" => {
                self.root_checks.fetch_add(1, Ordering::SeqCst);
                if self.rooted.load(Ordering::SeqCst) {
                    Ok(outcome(0, "uid=0(root) gid=0(root)\n", ""))
                } else {
                    Ok(outcome(1, "", "Permission denied\n"))
                }
            }
            "which" => {
                if self.su_on_path.load(Ordering::SeqCst) {
                    Ok(outcome(0, "/system/bin/su\n", ""))
                } else {
                    Ok(outcome(1, "", ""))
                }
            }
            other => Err(PureRootError::Spawn(format!("{}: unexpected program {:?}", other, args))),
        }
    }
}

#[async_trait]
impl PackageQuery for FakeDevice {
    async fn query(&self, package_name: &str) -> Result<Option<PackageState>> {
        Ok(self.state_of(package_name))
    }

    async fn list(&self) -> Result<Vec<PackageState>> {
        Ok(self.packages.lock().unwrap().values().cloned().collect())
    }
}

/// Records requests; answers them with `answer` unless it is `None`, in which
/// case requests are held for the test to inspect.
pub struct ScriptedResolver {
    pub answer: Mutex<Option<DenialResolution>>,
    pub launches: AtomicUsize,
    pub hints: Mutex<Vec<bool>>,
    pub held: Mutex<Vec<DenialRequest>>,
}

impl ScriptedResolver {
    pub fn answering(answer: Option<DenialResolution>) -> Arc<Self> {
        Arc::new(Self {
            answer: Mutex::new(answer),
            launches: AtomicUsize::new(0),
            hints: Mutex::new(Vec::new()),
            held: Mutex::new(Vec::new()),
        })
    }

    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

impl DenialResolver for ScriptedResolver {
    fn launch(&self, request: DenialRequest) {
        self.launches.fetch_add(1, Ordering::SeqCst);
        self.hints.lock().unwrap().push(request.binary_present());
        match *self.answer.lock().unwrap() {
            Some(answer) => request.resolve(answer),
            None => self.held.lock().unwrap().push(request),
        }
    }
}

#[derive(Default)]
pub struct RecordingObserver {
    pub verified: AtomicUsize,
    pub reacquired: AtomicUsize,
    pub notices: AtomicUsize,
}

impl RecordingObserver {
    pub fn counts(&self) -> (usize, usize, usize) {
        (
            self.verified.load(Ordering::SeqCst),
            self.reacquired.load(Ordering::SeqCst),
            self.notices.load(Ordering::SeqCst),
        )
    }
}

impl GateObserver for RecordingObserver {
    fn on_root_verified(&self) {
        self.verified.fetch_add(1, Ordering::SeqCst);
    }

    fn on_root_reacquired(&self) {
        self.reacquired.fetch_add(1, Ordering::SeqCst);
    }

    fn on_cooldown_notice(&self) {
        self.notices.fetch_add(1, Ordering::SeqCst);
    }
}

/// Context over a fake device with no superuser paths on disk.
pub fn app_for(device: &Arc<FakeDevice>) -> PureRoot {
    PureRoot::builder()
        .with_config(Config {
            su_paths: Vec::new(),
            ..Config::default()
        })
        .with_runner(Arc::clone(device) as Arc<dyn CommandRunner>)
        .with_package_query(Arc::clone(device) as Arc<dyn PackageQuery>)
        .build()
        .expect("valid test config")
}
