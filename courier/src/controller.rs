//! Wires configuration, collaborators and operator signals around a
//! [`DispatchService`]

use std::sync::Arc;

use courier_common::{
    internal,
    tracing::{self, warn},
};
use courier_dispatch::{
    DispatchService, EmailStatusRecord, LogSink, Mailer, MemoryContactStore, QueueBuilder,
    RecipientQueue, RecoveryOutcome, SendStatus, SessionResult, SourceRecord, StatusCounts,
};
use courier_provider::{LogMailer, ProviderClient};
use tokio::signal::unix::{SignalKind, signal};

use crate::config::CourierConfig;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SendOptions {
    /// Log instead of calling the provider
    pub dry_run: bool,
    /// Reset and resend failed and rate-limited recipients after the session
    pub recover: bool,
}

/// What a `send` run did
#[derive(Debug)]
pub struct Report {
    pub session: SessionResult,
    /// Outcomes of the recovery pass, when one ran
    pub recovered: Vec<RecoveryOutcome>,
    pub counts: StatusCounts,
    pub records: Vec<EmailStatusRecord>,
}

#[derive(Debug)]
pub struct Courier {
    config: CourierConfig,
}

impl Courier {
    #[must_use]
    pub const fn new(config: CourierConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &CourierConfig {
        &self.config
    }

    #[must_use]
    pub fn queue(&self, records: Vec<SourceRecord>) -> RecipientQueue {
        QueueBuilder::new(self.config.mappings.clone(), self.config.context.clone()).build(records)
    }

    fn mailer(&self, dry_run: bool) -> anyhow::Result<Arc<dyn Mailer>> {
        if dry_run {
            return Ok(Arc::new(LogMailer::new()));
        }

        let Some(provider) = self.config.provider.clone() else {
            anyhow::bail!("No provider configured; add a `provider` section or use --dry-run");
        };

        Ok(Arc::new(ProviderClient::new(provider)?))
    }

    /// Run one batch session over `records`, reacting to operator signals.
    ///
    /// # Errors
    ///
    /// Fails if the mailer cannot be built or signal handlers cannot be
    /// installed. Also fails when the operator aborts, either with a second
    /// interrupt during the session or with any interrupt during recovery.
    #[tracing::instrument(level = "info", skip_all, fields(records = records.len(), dry_run = options.dry_run))]
    pub async fn send(&self, records: Vec<SourceRecord>, options: SendOptions) -> anyhow::Result<Report> {
        let contacts = MemoryContactStore::with_contacts(
            records
                .iter()
                .filter_map(|record| record.last_contact.map(|at| (record.id.clone(), at))),
        );
        let queue = self.queue(records);

        for rejected in queue.rejected() {
            warn!(error = %rejected, "Recipient excluded");
        }

        let service = Arc::new(DispatchService::new(
            self.config.dispatch.clone(),
            self.mailer(options.dry_run)?,
            Arc::new(contacts),
        ));

        let mut sink = LogSink;
        let session = tokio::select! {
            result = service.start_session(queue, &mut sink) => result?,
            r = signals(Arc::clone(&service)) => {
                r?;
                anyhow::bail!("Aborted by operator");
            }
        };

        let recovered = if options.recover && !session.cancelled {
            tokio::select! {
                result = recover(&service) => result?,
                r = interrupted() => {
                    r?;
                    anyhow::bail!("Recovery aborted by operator");
                }
            }
        } else {
            Vec::new()
        };

        Ok(Report {
            session,
            recovered,
            counts: service.counts(),
            records: service.records(),
        })
    }
}

/// Reset every failed or rate-limited recipient, then resend each once
async fn recover(service: &DispatchService) -> anyhow::Result<Vec<RecoveryOutcome>> {
    let reset = service
        .reset_all(&[SendStatus::Failed, SendStatus::RateLimited])
        .await?;

    for (id, outcome) in &reset {
        if let Err(e) = outcome {
            warn!(recipient = %id, error = %e, "Could not reset recipient");
        }
    }

    internal!(level = INFO, "Reset {} recipients, resending", reset.len());

    Ok(service.resend_all_reset().await?)
}

/// Resolves on the first SIGINT or SIGTERM
async fn interrupted() -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;

    tokio::select! {
        r = tokio::signal::ctrl_c() => r?,
        _ = terminate.recv() => {}
    }

    internal!(level = WARN, "Interrupted during recovery, stopping");
    Ok(())
}

/// Handle operator signals for the running session.
///
/// SIGINT / SIGTERM cancel the session; a second SIGINT resolves this future
/// so the caller can abort. SIGUSR1 toggles pause.
async fn signals(service: Arc<DispatchService>) -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    let mut toggle = signal(SignalKind::user_defined1())?;
    let mut interrupted = false;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                if interrupted {
                    return Ok(());
                }
                interrupted = true;
                internal!(level = WARN, "CTRL+C entered -- Enter it again to force shutdown");
                if let Err(e) = service.cancel() {
                    warn!(error = %e, "Nothing to cancel");
                }
            }
            _ = terminate.recv() => {
                internal!(level = WARN, "Terminate Signal received, cancelling session");
                if let Err(e) = service.cancel() {
                    warn!(error = %e, "Nothing to cancel");
                }
            }
            _ = toggle.recv() => {
                match service.toggle_pause() {
                    Ok(true) => internal!(level = INFO, "Session paused"),
                    Ok(false) => internal!(level = INFO, "Session resumed"),
                    Err(e) => warn!(error = %e, "Nothing to pause"),
                }
            }
        }
    }
}
