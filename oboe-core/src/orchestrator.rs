//! Turn orchestrator
//!
//! Drives one turn through the state machine:
//!
//! ```text
//! Start → Authenticating → ConsentCheck → TokenResolution → ToolAssembly
//!       → Reasoning ⇄ ToolDispatch → Responding → Done
//!
//! ConsentCheck ─(consent missing)→ Responding
//! any state ─(unrecoverable)→ Aborted
//! ```
//!
//! The whole turn runs under a wall-clock budget and a cancellation token.
//! Tool calls run on their own tasks; if the turn is cancelled or times
//! out they finish on their own and their results are dropped.

use crate::activity::{ActivityContent, InboundActivity, Notification, MESSAGE_FALLBACK_REPLY};
use crate::broker::Broker;
use crate::outcome::{TurnError, TurnOutcome};
use crate::reasoning::{
    Reasoner, ReasoningRequest, ReasoningStep, ToolCallOutcome, ToolCallReport, ToolCallRequest,
    ToolFailure, ToolFailureClass, ToolSpec,
};
use crate::turn::{TurnContext, TurnState};
use futures::future::join_all;
use oboe_auth::{AuthError, ConsentStatus};
use oboe_common::{ErrorKind, Failure, ResourceScope};
use oboe_tools::{ToolCatalog, ToolDescriptor, ToolInvoker};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

/// What the reasoner is asked, in order
struct TurnPlan {
    prompt: String,
    notification: Option<Notification>,
    fallback: &'static str,
}

impl TurnPlan {
    fn for_content(content: &ActivityContent) -> Self {
        match content {
            ActivityContent::Message { text } => Self {
                prompt: text.clone(),
                notification: None,
                fallback: MESSAGE_FALLBACK_REPLY,
            },
            ActivityContent::Notification(notification) => Self {
                prompt: notification.prompt(),
                notification: Some(notification.clone()),
                fallback: notification.fallback_reply(),
            },
        }
    }
}

/// Runs turns against a broker
#[derive(Clone)]
pub struct TurnOrchestrator {
    broker: Arc<Broker>,
    reasoner: Arc<dyn Reasoner>,
}

impl TurnOrchestrator {
    pub fn new(broker: Arc<Broker>, reasoner: Arc<dyn Reasoner>) -> Self {
        Self { broker, reasoner }
    }

    pub fn broker(&self) -> &Arc<Broker> {
        &self.broker
    }

    /// Run a chat message turn
    pub async fn handle_message(
        &self,
        subject_token: &str,
        conversation_id: &str,
        text: &str,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        self.handle(
            InboundActivity::message(subject_token, conversation_id, text),
            cancel,
        )
        .await
    }

    /// Run a notification turn
    pub async fn handle_notification(
        &self,
        subject_token: &str,
        conversation_id: &str,
        notification: Notification,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        self.handle(
            InboundActivity::notification(subject_token, conversation_id, notification),
            cancel,
        )
        .await
    }

    /// Run one turn for `activity`
    pub async fn handle(
        &self,
        activity: InboundActivity,
        cancel: CancellationToken,
    ) -> Result<TurnOutcome, TurnError> {
        let turn_id = Uuid::new_v4();
        let span = tracing::info_span!(
            "turn",
            turn = %turn_id,
            conversation = %activity.conversation_id,
            subject = tracing::field::Empty,
        );
        let budget = self.broker.config().turn.budget;
        let (state_tx, state_rx) = watch::channel(TurnState::Start);

        let run = self.run(turn_id, activity, state_tx).instrument(span.clone());

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(TurnError::new(
                *state_rx.borrow(),
                ErrorKind::Cancelled,
                "turn cancelled",
            )),
            finished = tokio::time::timeout(budget, run) => match finished {
                Ok(result) => result,
                Err(_) => Err(TurnError::new(
                    *state_rx.borrow(),
                    ErrorKind::Timeout,
                    format!("turn exceeded its {:?} budget", budget),
                )),
            },
        };

        span.in_scope(|| match &result {
            Ok(outcome) => tracing::info!(state = %TurnState::Done, invocations = outcome.invocations().len(), "Turn finished"),
            Err(e) => tracing::warn!(state = %TurnState::Aborted, from = %e.state, kind = %e.kind(), error = %e.failure.message, "Turn aborted"),
        });
        result
    }

    async fn run(
        &self,
        turn_id: Uuid,
        activity: InboundActivity,
        state: watch::Sender<TurnState>,
    ) -> Result<TurnOutcome, TurnError> {
        let enter = |next: TurnState| {
            tracing::debug!(state = %next, "Turn state");
            state.send_replace(next);
            next
        };
        let abort = |at: TurnState, failure: Failure| TurnError { state: at, failure };

        // Authenticating
        let at = enter(TurnState::Authenticating);
        let principal = self
            .broker
            .identity()
            .authenticate(&activity.subject_token)
            .await
            .map_err(|e| abort(at, e.to_failure()))?;
        tracing::Span::current().record("subject", principal.subject_id.as_str());

        let mut ctx = TurnContext::new(turn_id, activity.conversation_id.clone(), principal);
        let plan = TurnPlan::for_content(&activity.content);
        let required = self.broker.config().required_scopes();

        // ConsentCheck
        let at = enter(TurnState::ConsentCheck);
        let mut missing = Vec::new();
        for scope in &required {
            let status = self
                .broker
                .consent()
                .check(&ctx.principal.subject_id, scope)
                .await
                .map_err(|e| abort(at, e.to_failure()))?;
            if status == ConsentStatus::NotGranted {
                missing.push(scope);
            }
        }
        if !missing.is_empty() {
            enter(TurnState::Responding);
            tracing::info!(scopes = ?missing.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), "Consent required");
            enter(TurnState::Done);
            return Ok(TurnOutcome::consent(&missing));
        }

        // TokenResolution
        let at = enter(TurnState::TokenResolution);
        let resolutions = join_all(
            required
                .iter()
                .map(|scope| self.broker.tokens().get(&ctx.principal, scope)),
        )
        .await;

        let mut consent_needed: Vec<&ResourceScope> = Vec::new();
        for (scope, resolution) in required.iter().zip(resolutions) {
            match resolution {
                Ok(token) => {
                    ctx.tokens.insert(scope.id.clone(), token);
                }
                Err(e @ AuthError::InvalidToken(_)) => return Err(abort(at, e.to_failure())),
                Err(AuthError::ConsentRequired { .. }) => consent_needed.push(scope),
                Err(e) => ctx.notice(Failure::new(
                    e.kind(),
                    format!("{} is unavailable: {}", scope.label(), e),
                )),
            }
        }
        if !consent_needed.is_empty() {
            enter(TurnState::Responding);
            enter(TurnState::Done);
            return Ok(TurnOutcome::consent(&consent_needed));
        }

        self.load_profile(&mut ctx).await;

        // ToolAssembly
        enter(TurnState::ToolAssembly);
        let catalog = self.assemble_catalog().await;
        let resolved: HashSet<String> = ctx.tokens.keys().cloned().collect();
        let offered = catalog.for_scopes(&resolved);
        let specs: Vec<ToolSpec> = offered.iter().map(ToolSpec::from).collect();
        tracing::debug!(tools = specs.len(), "Tools assembled");

        // Reasoning ⇄ ToolDispatch
        let mut reply = self
            .reason(&mut ctx, &offered, &specs, plan.prompt.clone(), &enter)
            .await?;
        if let Some(follow_up) = plan
            .notification
            .as_ref()
            .and_then(|n| n.follow_up(&reply))
        {
            reply = self
                .reason(&mut ctx, &offered, &specs, follow_up, &enter)
                .await?;
        }

        // Responding
        enter(TurnState::Responding);
        if reply.trim().is_empty() {
            reply = plan.fallback.to_string();
        }
        enter(TurnState::Done);

        let TurnContext {
            invocations,
            notices,
            ..
        } = ctx;
        if notices.is_empty() {
            Ok(TurnOutcome::Completed { reply, invocations })
        } else {
            Ok(TurnOutcome::Degraded {
                reply,
                failures: notices,
                invocations,
            })
        }
    }

    async fn load_profile(&self, ctx: &mut TurnContext) {
        let (Some(service), Some(config)) = (self.broker.profile(), &self.broker.config().profile)
        else {
            return;
        };
        let Some(token) = ctx.token_for(&config.scope) else {
            return;
        };

        match service.fetch(token.value()).await {
            Ok(profile) => ctx.profile = Some(profile),
            Err(failure) => tracing::warn!(error = %failure, "Profile lookup failed, continuing without it"),
        }
    }

    async fn assemble_catalog(&self) -> Arc<ToolCatalog> {
        let registry = self.broker.registry();
        match registry.ensure_fresh().await {
            Ok(Some(report)) if report.is_partial() => {
                tracing::warn!(unreachable = report.unreachable.len(), "Tool catalog is partial");
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Tool registry refresh failed, keeping previous catalog"),
        }
        registry.catalog()
    }

    async fn reason(
        &self,
        ctx: &mut TurnContext,
        offered: &[ToolDescriptor],
        specs: &[ToolSpec],
        message: String,
        enter: &impl Fn(TurnState) -> TurnState,
    ) -> Result<String, TurnError> {
        let max_steps = self.broker.config().turn.max_reasoning_steps;
        let mut history: Vec<ToolCallReport> = Vec::new();

        for step in 0..max_steps {
            let at = enter(TurnState::Reasoning);
            let request = ReasoningRequest {
                message: message.clone(),
                profile: ctx.profile.clone(),
                tools: specs.to_vec(),
                history: history.clone(),
            };

            let calls = match self.reasoner.step(request).await {
                Ok(ReasoningStep::Respond(reply)) => return Ok(reply),
                Ok(ReasoningStep::CallTools(calls)) => calls,
                Err(e) => {
                    return Err(TurnError::new(at, ErrorKind::ReasoningFailure, e.0));
                }
            };

            // Tools are only run when a later step can see their outcomes.
            if step + 1 == max_steps {
                tracing::warn!(step, pending = calls.len(), "Reasoning step limit reached, tool calls not run");
                break;
            }

            enter(TurnState::ToolDispatch);
            tracing::debug!(step, calls = calls.len(), "Dispatching tool calls");
            let reports = self.dispatch(ctx, offered, calls).await;
            ctx.invocations.extend(reports.iter().cloned());
            history.extend(reports);
        }

        ctx.notice(Failure::new(
            ErrorKind::ReasoningFailure,
            format!("reasoning stopped after {} steps", max_steps),
        ));
        Ok(String::new())
    }

    /// Run `calls` concurrently; reports come back in request order
    async fn dispatch(
        &self,
        ctx: &TurnContext,
        offered: &[ToolDescriptor],
        calls: Vec<ToolCallRequest>,
    ) -> Vec<ToolCallReport> {
        let retry_backoff = self.broker.config().turn.retry_backoff;

        let pending = calls.into_iter().map(|call| {
            let tool = offered.iter().find(|t| t.name == call.tool).cloned();
            let token = tool
                .as_ref()
                .and_then(|t| ctx.token_for(&t.required_scope))
                .map(|t| t.value().to_string());
            let invoker = self.broker.invoker().clone();

            async move {
                let (Some(tool), Some(token)) = (tool, token) else {
                    return ToolCallReport {
                        call_id: call.call_id,
                        tool: call.tool.clone(),
                        outcome: ToolCallOutcome::Failed {
                            failure: ToolFailure {
                                class: ToolFailureClass::UnknownTool,
                                message: format!("tool '{}' is not available", call.tool),
                            },
                        },
                        attempts: 0,
                    };
                };

                let ToolCallRequest {
                    call_id, arguments, ..
                } = call;
                let name = tool.name.clone();
                let task = tokio::spawn(
                    invoke_with_retry(invoker, tool, arguments, token, retry_backoff)
                        .in_current_span(),
                );

                match task.await {
                    Ok((outcome, attempts)) => ToolCallReport {
                        call_id,
                        tool: name,
                        outcome,
                        attempts,
                    },
                    Err(e) => ToolCallReport {
                        call_id,
                        tool: name,
                        outcome: ToolCallOutcome::Failed {
                            failure: ToolFailure {
                                class: ToolFailureClass::Upstream { code: 500 },
                                message: format!("tool task failed: {}", e),
                            },
                        },
                        attempts: 1,
                    },
                }
            }
        });

        join_all(pending).await
    }
}

/// One call plus at most one retry for transient failures
async fn invoke_with_retry(
    invoker: Arc<dyn ToolInvoker>,
    tool: ToolDescriptor,
    arguments: serde_json::Value,
    token: String,
    retry_backoff: Duration,
) -> (ToolCallOutcome, u8) {
    let started = Instant::now();
    let mut attempts = 1;
    let mut result = invoker.invoke(&tool, &arguments, &token).await;

    if let Err(e) = &result {
        if e.is_transient() {
            tracing::warn!(tool = %tool.name, error = %e, "Transient tool failure, retrying once");
            tokio::time::sleep(retry_backoff).await;
            attempts += 1;
            result = invoker.invoke(&tool, &arguments, &token).await;
        }
    }

    tracing::info!(
        tool = %tool.name,
        server = %tool.server,
        attempts,
        ok = result.is_ok(),
        duration_ms = started.elapsed().as_millis() as u64,
        "Tool call"
    );

    let outcome = match result {
        Ok(result) => ToolCallOutcome::Success { result },
        Err(e) => ToolCallOutcome::Failed {
            failure: ToolFailure::from(&e),
        },
    };
    (outcome, attempts)
}
