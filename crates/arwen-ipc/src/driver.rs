//! Node-side supervisor of the arwen child process.
//!
//! [`ArwenDriver`] owns the child and its pipe set. It never repairs a broken
//! dialogue: any critical error kills the child, and the next call starts a
//! fresh one with fresh pipes.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use nix::sys::signal;
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::unix::pipe;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::bridge::codec::{DEFAULT_MAX_FRAME_LENGTH, RecordCodec};
use crate::bridge::protocol::{ArwenArguments, LogLine, LogProfile, MessageBody};
use crate::error::IpcError;
use crate::handshake;
use crate::hook::BlockchainHook;
use crate::logs::emit_forwarded_log;
use crate::messenger::Messenger;
use crate::node_part::{NodeConfig, NodePart};
use crate::pipes::PipeSet;
use crate::vm::{ContractCallInput, ContractCreateInput, GasSchedule, VmOutput};

/// How long `stop` waits for the child to exit before killing it.
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// How long `stop` waits for the log forwarders to drain after exit.
const FORWARDER_DRAIN: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Explicit path to the executable; checked before any lookup.
    pub executable: Option<PathBuf>,
    /// File name looked up in the working directory.
    pub executable_name: String,
    /// Environment variable holding the executable path.
    pub path_env_var: String,
    pub receive_timeout: Duration,
    pub max_loop_time: Duration,
    pub max_frame_length: usize,
    pub log_profile: LogProfile,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            executable: None,
            executable_name: "arwen".to_string(),
            path_env_var: "ARWEN_PATH".to_string(),
            receive_timeout: Duration::from_secs(1),
            max_loop_time: Duration::from_secs(10),
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            log_profile: LogProfile::default(),
        }
    }
}

impl DriverConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.executable = Some(path.into());
        self
    }

    pub fn with_executable_name(mut self, name: impl Into<String>) -> Self {
        self.executable_name = name.into();
        self
    }

    pub fn with_path_env_var(mut self, var: impl Into<String>) -> Self {
        self.path_env_var = var.into();
        self
    }

    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    pub fn with_max_loop_time(mut self, max: Duration) -> Self {
        self.max_loop_time = max;
        self
    }

    pub fn with_max_frame_length(mut self, max: usize) -> Self {
        self.max_frame_length = max;
        self
    }

    pub fn with_log_profile(mut self, profile: LogProfile) -> Self {
        self.log_profile = profile;
        self
    }

    /// Rejects settings under which no dialogue could ever succeed.
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.max_loop_time.is_zero() {
            return Err(DriverError::InvalidConfig("max_loop_time must be non-zero"));
        }
        Ok(())
    }

    pub fn node_config(&self) -> NodeConfig {
        NodeConfig::new()
            .with_receive_timeout(self.receive_timeout)
            .with_max_loop_time(self.max_loop_time)
    }

    /// Resolves the child executable: the explicit override, then
    /// `executable_name` in the working directory, then the path in
    /// `path_env_var`.
    pub fn locate_executable(&self) -> Result<PathBuf, DriverError> {
        self.locate_with(|var| std::env::var_os(var))
    }

    fn locate_with(
        &self,
        env: impl Fn(&str) -> Option<std::ffi::OsString>,
    ) -> Result<PathBuf, DriverError> {
        if let Some(path) = &self.executable {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(DriverError::NotFound {
                name: path.display().to_string(),
            });
        }

        if let Ok(cwd) = std::env::current_dir() {
            let candidate = cwd.join(&self.executable_name);
            if candidate.is_file() {
                return Ok(candidate);
            }
        }

        if let Some(path) = env(&self.path_env_var).map(PathBuf::from)
            && path.is_file()
        {
            return Ok(path);
        }

        Err(DriverError::NotFound {
            name: self.executable_name.clone(),
        })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    #[error("invalid driver configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("arwen executable not found: {name}")]
    NotFound { name: String },

    #[error("failed to spawn arwen: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to set up arwen pipes: {0}")]
    Pipes(#[source] std::io::Error),

    #[error("failed to kill arwen: {0}")]
    Kill(#[source] std::io::Error),

    #[error("arwen is not running")]
    NotRunning,

    /// The dialogue broke; the child has been closed.
    #[error("critical arwen error: {0}")]
    Critical(#[source] IpcError),

    /// The VM reported a failure; the child is healthy.
    #[error("contract execution failed: {0}")]
    Contract(String),
}

impl DriverError {
    /// True unless the error is a contract-level failure.
    pub fn is_critical(&self) -> bool {
        !matches!(self, DriverError::Contract(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DriverError::Critical(err) if err.is_timeout())
    }
}

struct ArwenProcess {
    child: Child,
    part: NodePart<pipe::Receiver, pipe::Sender>,
    log_profile: FramedWrite<pipe::Sender, RecordCodec<LogProfile>>,
    forwarders: Vec<JoinHandle<()>>,
}

impl ArwenProcess {
    async fn kill(mut self) -> Result<(), DriverError> {
        for forwarder in &self.forwarders {
            forwarder.abort();
        }
        if let Ok(Some(_)) = self.child.try_wait() {
            return Ok(());
        }
        self.child.kill().await.map_err(DriverError::Kill)
    }

    async fn drain_forwarders(&mut self) {
        for forwarder in self.forwarders.drain(..) {
            let _ = tokio::time::timeout(FORWARDER_DRAIN, forwarder).await;
        }
    }
}

/// Runs contracts in a supervised arwen child.
pub struct ArwenDriver {
    hook: Box<dyn BlockchainHook>,
    arguments: ArwenArguments,
    config: DriverConfig,
    process: Option<ArwenProcess>,
    counter_deploy: u64,
    counter_call: u64,
}

impl ArwenDriver {
    /// Creates the driver and starts the first child.
    pub async fn new(
        hook: Box<dyn BlockchainHook>,
        arguments: ArwenArguments,
        config: DriverConfig,
    ) -> Result<Self, DriverError> {
        config.validate()?;
        let arguments = arguments.with_max_frame_length(config.max_frame_length);
        let mut driver = Self {
            hook,
            arguments,
            config,
            process: None,
            counter_deploy: 0,
            counter_call: 0,
        };
        driver.start().await?;
        Ok(driver)
    }

    async fn start(&mut self) -> Result<(), DriverError> {
        if let Err(err) = self.close().await {
            tracing::warn!(error = %err, "failed to close previous arwen");
        }

        let path = self.config.locate_executable()?;
        tracing::debug!(path = %path.display(), "starting arwen");

        let pipes = PipeSet::new().map_err(DriverError::Pipes)?;
        let mut command = Command::new(&path);
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        pipes.attach(&mut command);

        let mut child = command.spawn().map_err(DriverError::Spawn)?;
        let ends = pipes.into_node_ends().map_err(DriverError::Pipes)?;

        let format = self.arguments.logs_format;
        let max_frame_length = self.arguments.max_frame_length;
        let mut forwarders = Vec::with_capacity(3);
        if let Some(stdout) = child.stdout.take() {
            forwarders.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::info!(target: "arwen::stdout", "{}", line.trim_end());
                }
            }));
        }
        if let Some(stderr) = child.stderr.take() {
            forwarders.push(tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::error!(target: "arwen::stderr", "{}", line.trim_end());
                }
            }));
        }
        let mut logs = FramedRead::new(ends.log, RecordCodec::<LogLine>::new(format, max_frame_length));
        forwarders.push(tokio::spawn(async move {
            while let Some(line) = logs.next().await {
                match line {
                    Ok(line) => emit_forwarded_log(&line),
                    Err(e) => {
                        tracing::warn!(error = %e, "arwen log pipe failed");
                        break;
                    }
                }
            }
        }));

        // A failure past this point drops `child`, which kills it.
        handshake::send_arguments(ends.init, &self.arguments)
            .await
            .map_err(DriverError::Critical)?;

        let mut log_profile = FramedWrite::new(ends.log_profile, RecordCodec::new(format, max_frame_length));
        log_profile
            .send(self.config.log_profile.clone())
            .await
            .map_err(|e| DriverError::Critical(e.into()))?;

        let messenger = Messenger::new(
            "node",
            ends.output,
            ends.input,
            self.arguments.messages_format,
            max_frame_length,
        );

        tracing::info!(pid = child.id(), path = %path.display(), "arwen started");
        self.process = Some(ArwenProcess {
            child,
            part: NodePart::new(messenger, self.config.node_config()),
            log_profile,
            forwarders,
        });
        Ok(())
    }

    /// Whether the current child is still running. Reaps it if it has exited.
    pub fn is_alive(&mut self) -> bool {
        let Some(process) = self.process.as_mut() else {
            return false;
        };
        match process.child.try_wait() {
            Ok(None) => {}
            Ok(Some(status)) => {
                tracing::debug!(%status, "arwen has exited");
                return false;
            }
            Err(e) => {
                tracing::debug!(error = %e, "cannot query arwen status");
                return false;
            }
        }
        let Some(pid) = process.child.id().and_then(|pid| i32::try_from(pid).ok()) else {
            return false;
        };
        signal::kill(Pid::from_raw(pid), None).is_ok()
    }

    /// Restarts the child, with a fresh pipe set, unless it is alive.
    pub async fn ensure_alive(&mut self) -> Result<(), DriverError> {
        if self.is_alive() {
            return Ok(());
        }
        tracing::warn!("arwen is not running, restarting");
        self.start().await
    }

    pub async fn run_create(&mut self, input: ContractCreateInput) -> Result<VmOutput, DriverError> {
        self.counter_deploy += 1;
        tracing::trace!(counter = self.counter_deploy, "run_create");
        let body = self
            .dialogue(MessageBody::ContractDeployRequest(input))
            .await?;
        self.contract_output(body).await
    }

    pub async fn run_call(&mut self, input: ContractCallInput) -> Result<VmOutput, DriverError> {
        self.counter_call += 1;
        tracing::trace!(
            counter = self.counter_call,
            function = %input.function,
            "run_call"
        );
        let body = self.dialogue(MessageBody::ContractCallRequest(input)).await?;
        self.contract_output(body).await
    }

    /// Asks the child to sleep for `milliseconds`. Exceeding the receive
    /// timeout is critical and closes the child like any other failure.
    pub async fn diagnose_wait(&mut self, milliseconds: u32) -> Result<(), DriverError> {
        match self
            .dialogue(MessageBody::DiagnoseWaitRequest { milliseconds })
            .await?
        {
            MessageBody::DiagnoseWaitResponse(result) => result.map_err(DriverError::Contract),
            other => Err(self.protocol_violation(other).await),
        }
    }

    /// Forwards a new gas schedule. Once accepted it is also part of the
    /// arguments every future restart is initialized with.
    pub async fn gas_schedule_change(&mut self, schedule: GasSchedule) -> Result<(), DriverError> {
        match self
            .dialogue(MessageBody::GasScheduleChangeRequest(schedule.clone()))
            .await?
        {
            MessageBody::GasScheduleChangeResponse(result) => {
                result.map_err(DriverError::Contract)?;
                self.arguments.vm_host_parameters.gas_schedule = schedule;
                Ok(())
            }
            other => Err(self.protocol_violation(other).await),
        }
    }

    pub async fn version(&mut self) -> Result<String, DriverError> {
        match self.dialogue(MessageBody::VersionRequest).await? {
            MessageBody::VersionResponse(version) => Ok(version),
            other => Err(self.protocol_violation(other).await),
        }
    }

    /// Replaces the child's log filter. Also applied to every future restart.
    pub async fn set_log_profile(&mut self, profile: LogProfile) -> Result<(), DriverError> {
        self.config.log_profile = profile.clone();
        self.ensure_alive().await?;
        let process = self.process.as_mut().ok_or(DriverError::NotRunning)?;
        process
            .log_profile
            .send(profile)
            .await
            .map_err(|e| DriverError::Critical(e.into()))
    }

    /// Polite shutdown: sends `Stop` and waits for the child to exit, killing
    /// it if it does not. The next call starts a new child.
    pub async fn stop(&mut self) -> Result<(), DriverError> {
        let Some(mut process) = self.process.take() else {
            return Ok(());
        };
        if let Err(err) = process.part.send_stop_signal().await {
            tracing::warn!(error = %err, "failed to send stop to arwen");
        }
        match tokio::time::timeout(STOP_GRACE_PERIOD, process.child.wait()).await {
            Ok(Ok(status)) => {
                tracing::info!(%status, "arwen stopped");
                process.drain_forwarders().await;
            }
            Ok(Err(e)) => tracing::warn!(error = %e, "failed to wait for arwen"),
            Err(_) => tracing::warn!("arwen ignored stop, killing it"),
        }
        process.kill().await
    }

    /// Kills the child and waits for it. Pipes are released with it.
    pub async fn close(&mut self) -> Result<(), DriverError> {
        match self.process.take() {
            Some(process) => process.kill().await,
            None => Ok(()),
        }
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|process| process.child.id())
    }

    pub fn counters(&self) -> (u64, u64) {
        (self.counter_deploy, self.counter_call)
    }

    async fn dialogue(&mut self, request: MessageBody) -> Result<MessageBody, DriverError> {
        self.ensure_alive().await?;
        let kind = request.kind();
        let result = match self.process.as_mut() {
            Some(process) => process.part.start_loop(request, self.hook.as_mut()).await,
            None => return Err(DriverError::NotRunning),
        };
        match result {
            Ok(body) => Ok(body),
            Err(err) => {
                tracing::error!(?kind, error = %err, "arwen dialogue failed, closing arwen");
                if let Err(close_err) = self.close().await {
                    tracing::warn!(error = %close_err, "failed to close arwen");
                }
                Err(DriverError::Critical(err))
            }
        }
    }

    async fn contract_output(&mut self, body: MessageBody) -> Result<VmOutput, DriverError> {
        match body {
            MessageBody::ContractResponse(result) => result.map_err(DriverError::Contract),
            other => Err(self.protocol_violation(other).await),
        }
    }

    async fn protocol_violation(&mut self, body: MessageBody) -> DriverError {
        tracing::error!(kind = ?body.kind(), "arwen answered with the wrong message kind");
        if let Err(err) = self.close().await {
            tracing::warn!(error = %err, "failed to close arwen");
        }
        DriverError::Critical(IpcError::UnexpectedMessage { kind: body.tag() })
    }
}
