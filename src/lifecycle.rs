//! Startup and shutdown sequencing.
//!
//! Startup runs address resolution, firewall open, bind and spawn strictly in
//! that order, and the announcement is only produced once all of them
//! succeeded. Shutdown waits on a single select over "termination requested"
//! and "server failed", so the firewall rule is closed on exactly one path.
//!
//! A process killed without a catchable signal (SIGKILL, power loss) leaves
//! the rule in place until firewalld reloads; nothing here can prevent that.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::address::{self, AddressError, ReachableAddress};
use crate::config::{AnnounceMode, Settings};
use crate::firewall::{FirewallController, FirewallError, FirewallRule, Firewalld, OpenRule};
use crate::precheck::ServeTarget;
use crate::server::{self, ServerConfig, ServerError, ServerHandle};

/// Lifecycle states, in the order a successful run passes through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    FirewallOpening,
    ServerStarting,
    Running,
    ClosingFirewall,
    Terminated,
    Failed,
}

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error(transparent)]
    Address(#[from] AddressError),

    #[error("Error opening firewall port")]
    FirewallOpen(#[source] FirewallError),

    #[error(transparent)]
    Bind(ServerError),

    #[error("Error starting server")]
    Setup(#[source] io::Error),

    #[error(transparent)]
    Server(ServerError),

    #[error("Error removing firewall port, {port}/tcp may still be open in zone {zone}")]
    Close {
        port: u16,
        zone: String,
        #[source]
        source: FirewallError,
    },

    #[error("Failed to install signal handler")]
    Signal(#[source] io::Error),
}

/// Firewall part of a share: the controller and the zone to open in.
#[derive(Clone)]
struct FirewallPlan {
    controller: FirewallController,
    zone: String,
}

/// Sequences one share from start to shutdown.
pub struct Coordinator {
    target: Arc<ServeTarget>,
    server: ServerConfig,
    announce: AnnounceMode,
    firewall: Option<FirewallPlan>,
    phase: Phase,
}

impl Coordinator {
    /// Share `target` without firewall integration.
    pub fn new(target: ServeTarget, server: ServerConfig, announce: AnnounceMode) -> Self {
        Self {
            target: Arc::new(target),
            server,
            announce,
            firewall: None,
            phase: Phase::Init,
        }
    }

    /// Open a rule for the server port in `zone` before binding.
    pub fn with_firewall(mut self, controller: FirewallController, zone: impl Into<String>) -> Self {
        self.firewall = Some(FirewallPlan {
            controller,
            zone: zone.into(),
        });
        self
    }

    /// Build a coordinator from merged settings, using firewalld if enabled.
    pub fn from_settings(target: ServeTarget, settings: &Settings) -> Self {
        let coordinator = Self::new(target, settings.server_config(), settings.announce);
        if settings.firewall {
            let backend = Firewalld::with_binary(settings.firewall_cmd.clone());
            coordinator.with_firewall(FirewallController::new(Arc::new(backend)), settings.zone.clone())
        } else {
            coordinator
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    fn enter(&mut self, phase: Phase) {
        debug!(from = ?self.phase, to = ?phase, "Lifecycle transition");
        self.phase = phase;
    }

    fn fail(&mut self, err: LifecycleError) -> LifecycleError {
        self.enter(Phase::Failed);
        err
    }

    /// Resolve, open, bind and spawn. On success the share is `Running`.
    ///
    /// A bind failure closes the rule opened just before it.
    pub async fn start(mut self) -> Result<RunningShare, LifecycleError> {
        let address = match self.announce {
            AnnounceMode::Outbound => match address::resolve_outbound_local_address() {
                Ok(ip) => ReachableAddress::Ip(ip),
                Err(e) => return Err(self.fail(e.into())),
            },
            AnnounceMode::Localhost => ReachableAddress::Localhost,
        };

        let rule = match self.firewall.clone() {
            Some(plan) => {
                self.enter(Phase::FirewallOpening);
                info!(
                    port = self.server.port,
                    zone = %plan.zone,
                    backend = plan.controller.backend_name(),
                    "Opening firewall port"
                );
                let opened = match FirewallRule::tcp(self.server.port, plan.zone) {
                    Ok(rule) => plan.controller.open_async(rule).await,
                    Err(e) => Err(e),
                };
                match opened {
                    Ok(rule) => Some(rule),
                    Err(e) => return Err(self.fail(LifecycleError::FirewallOpen(e))),
                }
            }
            None => None,
        };

        self.enter(Phase::ServerStarting);
        let listener = match server::bind(&self.server).await {
            Ok(listener) => listener,
            Err(e) => {
                if let Some(rule) = rule {
                    warn!("Bind failed, removing the firewall rule opened for it");
                    if let Err(close_err) = rule.close_async().await {
                        error!(error = %close_err, "Port may still be open");
                    }
                }
                return Err(self.fail(LifecycleError::Bind(e)));
            }
        };

        let router = server::build_router(Arc::clone(&self.target));
        let handle = match server::spawn(listener, router) {
            Ok(handle) => handle,
            Err(e) => return Err(self.fail(LifecycleError::Setup(e))),
        };

        let port = handle.local_addr().port();
        let url = format!("http://{}:{}{}", address.host(), port, self.target.encoded_route());
        info!(
            file = %self.target.absolute_path().display(),
            port,
            "Serving file"
        );

        self.enter(Phase::Running);
        Ok(RunningShare {
            url,
            server: handle,
            rule,
            phase: self.phase,
        })
    }
}

/// A share that is serving and holds its firewall rule, if any.
#[derive(Debug)]
pub struct RunningShare {
    url: String,
    server: ServerHandle,
    rule: Option<OpenRule>,
    phase: Phase,
}

impl RunningShare {
    /// URL the file can be fetched from.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The line printed once the share is up.
    pub fn announcement(&self) -> String {
        format!("File is available at: {}", self.url)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.server.local_addr()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn firewall_rule(&self) -> Option<&FirewallRule> {
        self.rule.as_ref().map(OpenRule::rule)
    }

    /// Serve until `shutdown` resolves or the server fails, then stop the
    /// server and close the firewall rule.
    ///
    /// Returns `Ok` only if shutdown was requested and the rule (if any) was
    /// removed.
    pub async fn wait<F>(mut self, shutdown: F) -> Result<(), LifecycleError>
    where
        F: Future<Output = ()>,
    {
        let outcome = tokio::select! {
            _ = shutdown => Ok(()),
            err = self.server.failed() => Err(err),
        };

        if let Err(ref e) = outcome {
            error!(error = %e, "Server stopped");
        }
        self.server.shutdown().await;

        let closed = match self.rule.take() {
            Some(rule) => {
                self.phase = Phase::ClosingFirewall;
                info!("Removing firewall port");
                let port = rule.rule().port();
                let zone = rule.rule().zone().to_string();
                rule.close_async()
                    .await
                    .map_err(|source| LifecycleError::Close { port, zone, source })
            }
            None => Ok(()),
        };

        match (outcome, closed) {
            (Ok(()), Ok(())) => {
                self.phase = Phase::Terminated;
                debug!(phase = ?self.phase, "Share finished");
                Ok(())
            }
            (Ok(()), Err(e)) => Err(e),
            (Err(server_err), closed) => {
                if let Err(e) = closed {
                    error!(error = %e, "Failed to clean up after server failure");
                }
                Err(LifecycleError::Server(server_err))
            }
        }
    }
}

/// Interrupt and termination signal listener.
///
/// Installed before the firewall is touched, so a signal arriving during
/// startup is delivered once the share is running instead of killing the
/// process with the rule open.
pub struct ShutdownSignal {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
}

impl ShutdownSignal {
    #[cfg(unix)]
    pub fn install() -> io::Result<Self> {
        use tokio::signal::unix::{signal, SignalKind};
        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> io::Result<Self> {
        Ok(Self {})
    }

    /// Wait for the next signal and return its name.
    #[cfg(unix)]
    pub async fn recv(&mut self) -> &'static str {
        tokio::select! {
            _ = self.interrupt.recv() => "SIGINT",
            _ = self.terminate.recv() => "SIGTERM",
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> &'static str {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Ctrl+C handler failed");
            std::future::pending::<()>().await;
        }
        "Ctrl+C"
    }
}

/// Run a share until an interrupt or termination signal.
///
/// Prints the announcement to stdout after startup succeeds.
pub async fn run(coordinator: Coordinator) -> Result<(), LifecycleError> {
    let mut signals = ShutdownSignal::install().map_err(LifecycleError::Signal)?;

    let share = coordinator.start().await?;
    println!("{}", share.announcement());

    share
        .wait(async move {
            let name = signals.recv().await;
            info!(signal = name, "Received exit signal");
        })
        .await
}
