// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT

//! CommandHandler (spec §4.4): the complete slash-command surface plus
//! inline-button callback handling. Callback acknowledgement is the one
//! strict contract here — every callback is answered exactly once, even
//! on an invalid token or a failed action, so `handle_callback` is written
//! as a single linear path with the ack call on every branch's exit.

use std::collections::HashMap;
use std::sync::Arc;

use agentline_config::{AgentOptions, BotConfig};
use agentline_core::{ActionName, ActionToken, DeferredButtonAction, SessionService};
use agentline_platform::PlatformClient;
use agentline_store::Store;

use crate::providers::{format_providers_reply, provider_statuses};
use crate::youtube::SearchHelper;

const HELP_TEXT: &str = "\
commands:
/new - start a fresh session
/reset - start a fresh session (always replies with its id)
/status - show the current session
/summary - show the rolling summary
/mode [agent] - show or switch the current agent
/providers - show installed agent binaries
/stop - cancel the active run
/youtube <q>, /yt <q> - search youtube
/echo <text> - reply with <text>";

pub struct CommandHandler {
    bot_id: String,
    default_agent: String,
    known_agents: HashMap<String, AgentOptions>,
    store: Store,
    platform: Arc<dyn PlatformClient>,
    search: Arc<dyn SearchHelper>,
}

impl CommandHandler {
    pub fn new(
        bot: &BotConfig,
        store: Store,
        platform: Arc<dyn PlatformClient>,
        search: Arc<dyn SearchHelper>,
    ) -> Self {
        Self {
            bot_id: bot.bot_id.clone(),
            default_agent: bot.default_agent.clone(),
            known_agents: bot.agents.clone(),
            store,
            platform,
            search,
        }
    }

    fn sessions(&self) -> SessionService<Store> {
        SessionService::new(self.store.clone())
    }

    /// Dispatches one slash command (or NL-rewritten command), returning
    /// the reply text. The caller is responsible for sending it.
    pub async fn handle_command(&self, chat_id: i64, name: &str, args: &str) -> String {
        match name {
            "start" | "help" => HELP_TEXT.to_string(),
            "new" => self.new_session(chat_id).await,
            "reset" => self.new_session(chat_id).await,
            "status" => self.status(chat_id).await,
            "summary" => self.summary(chat_id).await,
            "mode" => self.mode(chat_id, args).await,
            "providers" => format_providers_reply(&provider_statuses(&self.known_agents)),
            "stop" => self.stop(chat_id).await,
            "youtube" | "yt" => self.youtube(args).await,
            "echo" => {
                if args.is_empty() {
                    "usage: /echo <text>".to_string()
                } else {
                    args.to_string()
                }
            }
            other => format!("unknown command: /{other}. try /help"),
        }
    }

    async fn new_session(&self, chat_id: i64) -> String {
        let sessions = self.sessions();
        let current = match sessions
            .get_or_create_active(&self.bot_id, chat_id, &self.default_agent)
            .await
        {
            Ok(s) => s,
            Err(e) => return format!("could not start a new session: {e}"),
        };
        match sessions.reset(&current).await {
            Ok(next) => format!("new session: {}", next.id),
            Err(e) => format!("could not start a new session: {e}"),
        }
    }

    async fn status(&self, chat_id: i64) -> String {
        let sessions = self.sessions();
        let session = match sessions
            .get_or_create_active(&self.bot_id, chat_id, &self.default_agent)
            .await
        {
            Ok(s) => s,
            Err(e) => return format!("could not load session: {e}"),
        };
        let thread = session.agent_thread_id.as_deref().unwrap_or("none");
        let preview = summary_preview(&session.rolling_summary);
        format!(
            "bot: {}\nagent: {}\nthread: {}\nsession: {}\nsummary: {}",
            self.bot_id, session.current_agent, thread, session.id, preview
        )
    }

    async fn summary(&self, chat_id: i64) -> String {
        let sessions = self.sessions();
        match sessions
            .get_or_create_active(&self.bot_id, chat_id, &self.default_agent)
            .await
        {
            Ok(session) if session.rolling_summary.is_empty() => "no summary yet".to_string(),
            Ok(session) => session.rolling_summary,
            Err(e) => format!("could not load session: {e}"),
        }
    }

    async fn mode(&self, chat_id: i64, args: &str) -> String {
        let sessions = self.sessions();
        let session = match sessions
            .get_or_create_active(&self.bot_id, chat_id, &self.default_agent)
            .await
        {
            Ok(s) => s,
            Err(e) => return format!("could not load session: {e}"),
        };

        if args.is_empty() {
            return format!("current agent: {}\nusage: /mode <agent>", session.current_agent);
        }

        if !self.known_agents.is_empty() && !self.known_agents.contains_key(args) {
            return format!("unknown agent: {args}");
        }

        match sessions.switch_agent(&session, args).await {
            Ok(Ok(_)) => {
                let _ = self
                    .store
                    .increment_metric(self.bot_id.clone(), format!("provider_switch_total.{args}"), 1)
                    .await;
                format!("switched to {args}")
            }
            Ok(Err(_)) => "cannot switch agent while a run is active, /stop first".to_string(),
            Err(e) => format!("could not switch agent: {e}"),
        }
    }

    async fn stop(&self, chat_id: i64) -> String {
        match self
            .store
            .find_active_run_job(self.bot_id.clone(), chat_id)
            .await
        {
            Ok(Some(run)) => match self.store.request_run_cancel(run.id).await {
                Ok(()) => "stopping the current run".to_string(),
                Err(e) => format!("could not stop the run: {e}"),
            },
            Ok(None) => "no active run".to_string(),
            Err(e) => format!("could not check for an active run: {e}"),
        }
    }

    async fn youtube(&self, args: &str) -> String {
        if args.is_empty() {
            return "usage: /youtube <query>".to_string();
        }
        match self.search.search(args).await {
            Ok(url) => url,
            Err(e) => format!("search failed: {e}"),
        }
    }

    /// Runs the action encoded by a pressed inline button, guaranteeing a
    /// single `answer_callback_query` call regardless of outcome (spec
    /// §4.4: "every callback query MUST be acknowledged... exactly once").
    pub async fn handle_callback(&self, chat_id: i64, callback_query_id: &str, token_str: &str) {
        let ack_text = self.run_callback_action(chat_id, token_str).await;
        let ack_ok = self
            .platform
            .answer_callback_query(callback_query_id, ack_text.as_deref())
            .await
            .is_ok();
        let metric = if ack_ok { "callback_ack_success" } else { "callback_ack_failed" };
        let _ = self
            .store
            .increment_metric(self.bot_id.clone(), metric.to_string(), 1)
            .await;
    }

    async fn run_callback_action(&self, chat_id: i64, token_str: &str) -> Option<String> {
        let token = match self.store.find_action_token(token_str.to_string()).await {
            Ok(Some(token)) => token,
            Ok(None) => return Some("this button no longer works".to_string()),
            Err(e) => return Some(format!("internal error: {e}")),
        };

        if token.bot_id != self.bot_id || token.chat_id != chat_id {
            return Some("this button no longer works".to_string());
        }
        if !token.is_usable() {
            return Some("this button has expired".to_string());
        }
        match self.store.consume_action_token(token_str.to_string()).await {
            Ok(true) => {}
            Ok(false) => return Some("this button was already used".to_string()),
            Err(e) => return Some(format!("internal error: {e}")),
        }

        match token.action {
            ActionName::Summary => Some(self.summary(chat_id).await),
            ActionName::Stop => Some(self.stop(chat_id).await),
            ActionName::Regenerate | ActionName::Next => {
                self.defer_follow_up(chat_id, &token).await
            }
        }
    }

    async fn defer_follow_up(&self, chat_id: i64, token: &ActionToken) -> Option<String> {
        let sessions = self.sessions();
        let session = match sessions
            .get_or_create_active(&self.bot_id, chat_id, &self.default_agent)
            .await
        {
            Ok(s) => s,
            Err(e) => return Some(format!("internal error: {e}")),
        };
        let origin_turn_id = token
            .payload
            .get("turn_id")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let deferred = DeferredButtonAction::new(session.id, origin_turn_id, token.action);
        match self.store.insert_deferred_action(deferred).await {
            Ok(()) => Some("queued".to_string()),
            Err(e) => Some(format!("could not queue follow-up: {e}")),
        }
    }
}

fn summary_preview(summary: &str) -> String {
    if summary.is_empty() {
        return "no summary yet".to_string();
    }
    let preview: String = summary.chars().take(80).collect();
    if preview.len() < summary.len() {
        format!("{preview}...")
    } else {
        preview
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentline_config::{RuntimeMode, WebhookConfig};
    use agentline_platform::MockPlatform;
    use agentline_store::Store;
    use serde_json::json;

    fn bot() -> BotConfig {
        BotConfig {
            bot_id: "bot1".to_string(),
            display_name: "Bot One".to_string(),
            runtime_mode: RuntimeMode::Embedded,
            owner_id: None,
            default_agent: "claude".to_string(),
            webhook: WebhookConfig::default(),
            agents: HashMap::new(),
        }
    }

    fn handler() -> (CommandHandler, Arc<MockPlatform>, Store) {
        let store = Store::open_in_memory().unwrap();
        let platform = Arc::new(MockPlatform::new());
        let search = Arc::new(crate::youtube::FixedAnswerSearchHelper::new(
            "https://www.youtube.com/watch?v=abc123",
        ));
        let handler = CommandHandler::new(&bot(), store.clone(), platform.clone(), search);
        (handler, platform, store)
    }

    #[tokio::test]
    async fn help_and_start_return_the_fixed_help_text() {
        let (h, _, _) = handler();
        assert_eq!(h.handle_command(1, "start", "").await, HELP_TEXT);
        assert_eq!(h.handle_command(1, "help", "").await, HELP_TEXT);
    }

    #[tokio::test]
    async fn new_creates_a_fresh_session_and_replies_with_its_id() {
        let (h, _, _) = handler();
        let reply = h.handle_command(1, "new", "").await;
        assert!(reply.starts_with("new session: "));
    }

    #[tokio::test]
    async fn status_reports_agent_and_session_id() {
        let (h, _, _) = handler();
        let reply = h.handle_command(1, "status", "").await;
        assert!(reply.contains("agent: claude"));
        assert!(reply.contains("thread: none"));
    }

    #[tokio::test]
    async fn summary_reports_no_summary_yet_for_a_new_session() {
        let (h, _, _) = handler();
        assert_eq!(h.handle_command(1, "summary", "").await, "no summary yet");
    }

    #[tokio::test]
    async fn mode_with_no_args_shows_current_agent() {
        let (h, _, _) = handler();
        let reply = h.handle_command(1, "mode", "").await;
        assert!(reply.contains("current agent: claude"));
    }

    #[tokio::test]
    async fn mode_switches_to_a_new_agent() {
        let (h, _, _) = handler();
        let reply = h.handle_command(1, "mode", "gemini").await;
        assert_eq!(reply, "switched to gemini");
        let reply = h.handle_command(1, "status", "").await;
        assert!(reply.contains("agent: gemini"));
    }

    #[tokio::test]
    async fn mode_refuses_switch_while_a_run_is_active() {
        let (h, _, store) = handler();
        let session = h
            .sessions()
            .get_or_create_active("bot1", 1, "claude")
            .await
            .unwrap();
        let turn = agentline_core::Turn::new(&session, "hi");
        store.create_turn(turn.clone()).await.unwrap();
        let run = agentline_core::RunJob::new(&turn);
        store.create_run_job(run).await.unwrap();

        let reply = h.handle_command(1, "mode", "gemini").await;
        assert!(reply.contains("cannot switch agent"));
    }

    #[tokio::test]
    async fn stop_reports_no_active_run_when_none_exists() {
        let (h, _, _) = handler();
        assert_eq!(h.handle_command(1, "stop", "").await, "no active run");
    }

    #[tokio::test]
    async fn stop_requests_cancellation_of_the_active_run() {
        let (h, _, store) = handler();
        let session = h
            .sessions()
            .get_or_create_active("bot1", 1, "claude")
            .await
            .unwrap();
        let turn = agentline_core::Turn::new(&session, "hi");
        store.create_turn(turn.clone()).await.unwrap();
        let run = agentline_core::RunJob::new(&turn);
        store.create_run_job(run.clone()).await.unwrap();

        let reply = h.handle_command(1, "stop", "").await;
        assert_eq!(reply, "stopping the current run");
        let reloaded = store.get_run_job(run.id).await.unwrap();
        assert!(reloaded.cancel_requested);
    }

    #[tokio::test]
    async fn youtube_replies_with_the_fixed_search_result() {
        let (h, _, _) = handler();
        let reply = h.handle_command(1, "youtube", "cats").await;
        assert_eq!(reply, "https://www.youtube.com/watch?v=abc123");
    }

    #[tokio::test]
    async fn echo_replies_verbatim() {
        let (h, _, _) = handler();
        assert_eq!(h.handle_command(1, "echo", "hi there").await, "hi there");
    }

    #[tokio::test]
    async fn unknown_command_gets_a_help_pointer() {
        let (h, _, _) = handler();
        let reply = h.handle_command(1, "nonsense", "").await;
        assert!(reply.contains("unknown command"));
    }

    #[tokio::test]
    async fn callback_with_unknown_token_is_still_acknowledged() {
        let (h, platform, _) = handler();
        h.handle_callback(1, "cbq-1", "no-such-token").await;
        assert_eq!(platform.calls().len(), 1);
    }

    #[tokio::test]
    async fn callback_consumes_a_valid_summary_token_exactly_once() {
        let (h, platform, store) = handler();
        let token = ActionToken::new("bot1", 1, ActionName::Summary, json!({}));
        store.insert_action_token(token.clone()).await.unwrap();

        h.handle_callback(1, "cbq-1", &token.token).await;
        assert_eq!(platform.calls().len(), 1);

        h.handle_callback(1, "cbq-2", &token.token).await;
        assert_eq!(platform.calls().len(), 2);

        let calls = platform.calls();
        let agentline_platform::RecordedCall::AnswerCallbackQuery { text, .. } = &calls[1] else {
            panic!("expected AnswerCallbackQuery");
        };
        assert_eq!(text.as_deref(), Some("this button was already used"));
    }

    #[tokio::test]
    async fn callback_for_expired_token_is_acknowledged_with_an_expiry_message() {
        let (h, platform, store) = handler();
        let mut token = ActionToken::new("bot1", 1, ActionName::Summary, json!({}));
        token.expires_at = chrono::Utc::now() - chrono::Duration::seconds(1);
        store.insert_action_token(token.clone()).await.unwrap();

        h.handle_callback(1, "cbq-1", &token.token).await;

        let calls = platform.calls();
        let agentline_platform::RecordedCall::AnswerCallbackQuery { text, .. } = &calls[0] else {
            panic!("expected AnswerCallbackQuery");
        };
        assert_eq!(text.as_deref(), Some("this button has expired"));
    }
}
