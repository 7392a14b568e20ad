//! Scripted fakes for unit tests

use crate::build::{EngineProbe, ImageBuildRequest, ImageEngine};
use crate::cluster::ClusterClient;
use crate::deploy::helm::{ChartClient, Release};
use crate::config::HelmConfig;
use crate::error::{DevcycleError, DevcycleResult};
use crate::exec::{command_line, CommandExecutor, StreamCommand};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// A recorded tool invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub path: String,
    pub args: Vec<String>,
    /// Stdin fed to a streamed command
    pub input: Option<String>,
}

struct Step {
    path: String,
    args: Vec<String>,
    result: Result<String, String>,
}

#[derive(Default)]
struct ExecState {
    strict: bool,
    steps: VecDeque<Step>,
    fallback: String,
    calls: Vec<Invocation>,
}

/// Executor replaying fixed outputs
///
/// In strict mode every invocation must match the next expected step
/// (path and arguments, in order). In replaying mode every invocation
/// succeeds with the same output.
#[derive(Clone)]
pub struct ScriptedExecutor {
    state: Arc<Mutex<ExecState>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ExecState {
                strict: true,
                ..Default::default()
            })),
        }
    }

    pub fn replaying(output: &str) -> Self {
        Self {
            state: Arc::new(Mutex::new(ExecState {
                strict: false,
                fallback: output.to_string(),
                ..Default::default()
            })),
        }
    }

    pub fn expect<S: AsRef<str>>(self, path: &str, args: &[S], output: &str) -> Self {
        self.push(path, args, Ok(output.to_string()))
    }

    pub fn expect_failure<S: AsRef<str>>(self, path: &str, args: &[S], stderr: &str) -> Self {
        self.push(path, args, Err(stderr.to_string()))
    }

    fn push<S: AsRef<str>>(self, path: &str, args: &[S], result: Result<String, String>) -> Self {
        self.state.lock().unwrap().steps.push_back(Step {
            path: path.to_string(),
            args: args.iter().map(|a| a.as_ref().to_string()).collect(),
            result,
        });
        self
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn assert_done(&self) {
        let state = self.state.lock().unwrap();
        let left: Vec<String> = state
            .steps
            .iter()
            .map(|s| command_line(&s.path, &s.args))
            .collect();
        assert!(left.is_empty(), "expected invocations never happened: {:?}", left);
    }

    /// Check the invocation against the script, record it, return its index and result
    fn next(&self, path: &str, args: &[String]) -> (usize, Result<String, String>) {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Invocation {
            path: path.to_string(),
            args: args.to_vec(),
            input: None,
        });
        let index = state.calls.len() - 1;

        if !state.strict {
            return (index, Ok(state.fallback.clone()));
        }

        let step = match state.steps.pop_front() {
            Some(step) => step,
            None => {
                drop(state);
                panic!("unexpected invocation: {}", command_line(path, args));
            }
        };
        assert_eq!(step.path, path, "unexpected path for {}", command_line(path, args));
        assert_eq!(
            step.args.join(", "),
            args.join(", "),
            "unexpected args for {}",
            command_line(path, args)
        );
        (index, step.result)
    }
}

fn to_error(path: &str, args: &[String], result: Result<String, String>) -> DevcycleResult<String> {
    result.map_err(|stderr| DevcycleError::external_tool(command_line(path, args), "", stderr))
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn run(&self, path: &str, args: &[String]) -> DevcycleResult<Vec<u8>> {
        let (_, result) = self.next(path, args);
        to_error(path, args, result).map(String::into_bytes)
    }

    fn command(&self, path: &str, args: &[String]) -> Box<dyn StreamCommand> {
        let (index, result) = self.next(path, args);
        Box::new(ScriptedCommand {
            state: self.state.clone(),
            index,
            path: path.to_string(),
            args: args.to_vec(),
            result,
        })
    }
}

struct ScriptedCommand {
    state: Arc<Mutex<ExecState>>,
    index: usize,
    path: String,
    args: Vec<String>,
    result: Result<String, String>,
}

#[async_trait]
impl StreamCommand for ScriptedCommand {
    async fn run(
        self: Box<Self>,
        input: &[u8],
        on_output: &(dyn Fn(String) + Send + Sync),
    ) -> DevcycleResult<()> {
        self.state.lock().unwrap().calls[self.index].input =
            Some(String::from_utf8_lossy(input).into_owned());
        let output = to_error(&self.path, &self.args, self.result)?;
        for line in output.lines() {
            on_output(line.to_string());
        }
        Ok(())
    }
}

/// Fixed cluster context
pub struct FakeCluster {
    pub context: String,
    pub namespace: Option<String>,
}

impl FakeCluster {
    pub fn new(context: &str) -> Self {
        Self {
            context: context.to_string(),
            namespace: None,
        }
    }
}

impl ClusterClient for FakeCluster {
    fn current_context(&self) -> &str {
        &self.context
    }

    fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }
}

#[derive(Default)]
struct ChartState {
    releases: Vec<Release>,
    installs: Vec<(String, serde_yaml::Mapping)>,
    deletes: Vec<String>,
    list_calls: usize,
}

/// In-memory chart tool; installs bump the release revision
#[derive(Clone, Default)]
pub struct FakeChartClient {
    state: Arc<Mutex<ChartState>>,
    fail_install: Option<String>,
}

impl FakeChartClient {
    pub fn with_releases(releases: Vec<Release>) -> Self {
        let client = Self::default();
        client.state.lock().unwrap().releases = releases;
        client
    }

    pub fn failing_install(reason: &str) -> Self {
        Self {
            fail_install: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn installs(&self) -> Vec<(String, serde_yaml::Mapping)> {
        self.state.lock().unwrap().installs.clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.state.lock().unwrap().deletes.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn releases(&self) -> Vec<Release> {
        self.state.lock().unwrap().releases.clone()
    }
}

#[async_trait]
impl ChartClient for FakeChartClient {
    async fn list_releases(
        &self,
        _namespace: Option<&str>,
        _helm: &HelmConfig,
    ) -> DevcycleResult<Vec<Release>> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        Ok(state.releases.clone())
    }

    async fn template(
        &self,
        release: &str,
        _namespace: Option<&str>,
        values: &serde_yaml::Mapping,
        _helm: &HelmConfig,
    ) -> DevcycleResult<String> {
        let values = serde_yaml::to_string(values)?;
        Ok(format!("# Source: {}\n{}", release, values.trim_end()))
    }

    async fn install_chart(
        &self,
        release: &str,
        namespace: Option<&str>,
        values: &serde_yaml::Mapping,
        helm: &HelmConfig,
    ) -> DevcycleResult<Release> {
        if let Some(reason) = &self.fail_install {
            return Err(DevcycleError::external_tool(
                format!("helm upgrade {} {}", release, helm.chart.name),
                "",
                reason.clone(),
            ));
        }

        let mut state = self.state.lock().unwrap();
        state.installs.push((release.to_string(), values.clone()));

        let previous = state
            .releases
            .iter()
            .position(|r| r.name == release)
            .map(|i| state.releases.remove(i));
        let revision = previous
            .and_then(|r| r.revision.parse::<u64>().ok())
            .unwrap_or(0)
            + 1;

        let installed = Release {
            name: release.to_string(),
            namespace: namespace.unwrap_or("default").to_string(),
            revision: revision.to_string(),
            status: "deployed".to_string(),
            chart: helm.chart.name.clone(),
        };
        state.releases.push(installed.clone());
        Ok(installed)
    }

    async fn delete_release(
        &self,
        release: &str,
        _namespace: Option<&str>,
        _helm: &HelmConfig,
    ) -> DevcycleResult<()> {
        let mut state = self.state.lock().unwrap();
        state.deletes.push(release.to_string());
        state.releases.retain(|r| r.name != release);
        Ok(())
    }
}

#[derive(Default)]
struct EngineState {
    builds: Vec<(String, Vec<String>)>,
    list_calls: usize,
    availability_checks: usize,
}

/// Build engine with a fixed local image list
#[derive(Clone)]
pub struct FakeEngine {
    probe: EngineProbe,
    local_images: Vec<String>,
    fail_build: bool,
    state: Arc<Mutex<EngineState>>,
}

impl FakeEngine {
    pub fn present(local_images: &[&str]) -> Self {
        Self {
            probe: EngineProbe::Present,
            local_images: local_images.iter().map(|s| s.to_string()).collect(),
            fail_build: false,
            state: Arc::default(),
        }
    }

    pub fn absent() -> Self {
        Self {
            probe: EngineProbe::NotInstalled,
            ..Self::present(&[])
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_build: true,
            ..Self::present(&[])
        }
    }

    /// `(image, tags)` of every build
    pub fn builds(&self) -> Vec<(String, Vec<String>)> {
        self.state.lock().unwrap().builds.clone()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn availability_checks(&self) -> usize {
        self.state.lock().unwrap().availability_checks
    }
}

#[async_trait]
impl ImageEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    async fn probe(&self) -> EngineProbe {
        self.state.lock().unwrap().availability_checks += 1;
        self.probe.clone()
    }

    async fn list_images(&self) -> DevcycleResult<Vec<String>> {
        self.state.lock().unwrap().list_calls += 1;
        Ok(self.local_images.clone())
    }

    async fn build(&self, request: &ImageBuildRequest<'_>) -> DevcycleResult<()> {
        if self.fail_build {
            return Err(DevcycleError::ImageBuild {
                image: request.image.to_string(),
                reason: "step 3/7 failed".to_string(),
            });
        }
        self.state
            .lock()
            .unwrap()
            .builds
            .push((request.image.to_string(), request.tags.to_vec()));
        Ok(())
    }
}
