//! Flow actor: serializes every operation on one flow through a mailbox.
//!
//! Each flow gets one writer. Observers and the CLI talk to it through a
//! [`FlowHandle`]; status snapshots come back over a watch channel without
//! going through the mailbox.

use super::{ObserverCommand, ObserverInterface, ObserverResponse};
use crate::domain::{CoherenceOutcome, FlowError, ValidationOutcome};
use crate::state_machine::{FlowStatus, InitialContext};
use async_trait::async_trait;
use ractor::concurrency::JoinHandle;
use ractor::{Actor, ActorProcessingErr, ActorRef};
use tokio::sync::{oneshot, watch};

/// Messages that can be sent to the flow actor.
pub enum FlowMessage {
    /// Execute an observer command.
    Execute(Box<ObserverCommand>, oneshot::Sender<ObserverResponse>),
    /// Set and validate the initial context.
    Initialize(Box<InitialContext>, oneshot::Sender<ValidationOutcome>),
    /// Run a coherence check on the current context.
    CheckCoherence(oneshot::Sender<CoherenceOutcome>),
    /// Get the current status.
    Status(oneshot::Sender<FlowStatus>),
}

pub struct FlowActor;

#[async_trait]
impl Actor for FlowActor {
    type Msg = FlowMessage;
    type State = ObserverInterface;
    type Arguments = ObserverInterface;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        observer: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        tracing::debug!(flow_id = %observer.machine().context().flow_id, "flow actor started");
        Ok(observer)
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        match message {
            FlowMessage::Execute(command, reply) => {
                let response = state.execute(*command);
                if reply.send(response).is_err() {
                    tracing::debug!("Execute reply channel closed");
                }
            }
            FlowMessage::Initialize(initial, reply) => {
                let outcome = state.machine_mut().initialize(*initial);
                if reply.send(outcome).is_err() {
                    tracing::debug!("Initialize reply channel closed");
                }
            }
            FlowMessage::CheckCoherence(reply) => {
                let outcome = state.machine_mut().check_coherence();
                if reply.send(outcome).is_err() {
                    tracing::debug!("Coherence reply channel closed");
                }
            }
            FlowMessage::Status(reply) => {
                if reply.send(state.machine().status()).is_err() {
                    tracing::debug!("Status reply channel closed");
                }
            }
        }

        Ok(())
    }
}

/// Cloneable client for a running [`FlowActor`].
#[derive(Clone)]
pub struct FlowHandle {
    actor: ActorRef<FlowMessage>,
    status_rx: watch::Receiver<FlowStatus>,
}

impl FlowHandle {
    /// Spawns an actor owning `observer`.
    pub async fn spawn(observer: ObserverInterface) -> anyhow::Result<(Self, JoinHandle<()>)> {
        let status_rx = observer.machine().subscribe();
        let (actor, join) = FlowActor::spawn(None, FlowActor, observer)
            .await
            .map_err(|e| anyhow::anyhow!("failed to spawn flow actor: {}", e))?;
        Ok((Self { actor, status_rx }, join))
    }

    pub async fn execute(&self, command: ObserverCommand) -> Result<ObserverResponse, FlowError> {
        self.request(|reply| FlowMessage::Execute(Box::new(command), reply))
            .await
    }

    pub async fn initialize(&self, initial: InitialContext) -> Result<ValidationOutcome, FlowError> {
        self.request(|reply| FlowMessage::Initialize(Box::new(initial), reply))
            .await
    }

    pub async fn check_coherence(&self) -> Result<CoherenceOutcome, FlowError> {
        self.request(FlowMessage::CheckCoherence).await
    }

    pub async fn status(&self) -> Result<FlowStatus, FlowError> {
        self.request(FlowMessage::Status).await
    }

    /// Receiver for status snapshots, updated after every change.
    pub fn watch(&self) -> watch::Receiver<FlowStatus> {
        self.status_rx.clone()
    }

    pub fn stop(&self) {
        self.actor.stop(None);
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> FlowMessage,
    ) -> Result<T, FlowError> {
        let (reply, rx) = oneshot::channel();
        self.actor
            .send_message(build(reply))
            .map_err(|_| FlowError::ActorUnavailable {
                message: "mailbox closed".to_string(),
            })?;
        rx.await.map_err(|_| FlowError::ActorUnavailable {
            message: "reply channel dropped".to_string(),
        })
    }
}

#[cfg(test)]
#[path = "tests/actor_tests.rs"]
mod tests;
