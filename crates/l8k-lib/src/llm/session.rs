//! Single-shot profile selection and the multi-turn chat session

use super::{
    extract_fields, is_low_confidence, reasoning, ChatMessage, CompletionClient, LlmFields,
};
use crate::config::ClusterConfig;
use crate::context::RunContext;
use crate::error::{ExtractionError, LaunchError};
use std::sync::Arc;
use tracing::debug;

/// Compose the system prompt from static instructions, provider addenda and
/// the capabilities snapshot
pub fn build_system_prompt(
    instructions: &str,
    addenda: &[String],
    cluster: &ClusterConfig,
) -> Result<String, LaunchError> {
    let snapshot = serde_json::to_string(cluster).map_err(|e| {
        LaunchError::configuration(format!("failed to marshal cluster config: {}", e))
    })?;

    let mut prompt = instructions.trim_end().to_string();
    for addendum in addenda.iter().filter(|a| !a.trim().is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(addendum.trim_end());
    }
    prompt.push('\n');
    prompt.push_str(&snapshot);
    Ok(prompt)
}

/// Ask for a recommendation in one round trip
///
/// A response marked `confidence: low` is an error carrying the model's reasoning.
pub async fn select_profile(
    ctx: &RunContext,
    client: &dyn CompletionClient,
    system_prompt: &str,
    prompt_text: &str,
) -> Result<LlmFields, LaunchError> {
    debug!(prompt = %prompt_text, "User prompt");

    let response = ctx
        .run(async {
            client
                .complete(system_prompt, &[], prompt_text)
                .await
                .map_err(LaunchError::Llm)
        })
        .await?;
    debug!(response = %response, "LLM response");

    let fields = extract_fields(&response)?;
    if is_low_confidence(&fields) {
        return Err(LaunchError::LowConfidence {
            reasoning: reasoning(&fields),
        });
    }
    Ok(fields)
}

/// Stateful conversation; every call re-sends the fixed system prompt and full history
pub struct ChatSession {
    client: Arc<dyn CompletionClient>,
    system_prompt: String,
    history: Vec<ChatMessage>,
    last_response: String,
}

impl ChatSession {
    pub fn new(client: Arc<dyn CompletionClient>, system_prompt: impl Into<String>) -> Self {
        Self {
            client,
            system_prompt: system_prompt.into(),
            history: Vec::new(),
            last_response: String::new(),
        }
    }

    /// Append a user turn, ask the model, append and return its reply
    ///
    /// The user turn stays in the history even when the request fails.
    pub async fn send_message(
        &mut self,
        ctx: &RunContext,
        text: &str,
    ) -> Result<String, LaunchError> {
        self.history.push(ChatMessage::user(text));
        let prior = self.history.len() - 1;

        debug!(message = %text, turns = prior, "Sending message to LLM");
        let client = Arc::clone(&self.client);
        let response = ctx
            .run(async {
                client
                    .complete(&self.system_prompt, &self.history[..prior], text)
                    .await
                    .map_err(LaunchError::Llm)
            })
            .await?;
        debug!(response = %response, "LLM response");

        self.last_response = response.clone();
        self.history.push(ChatMessage::assistant(response.clone()));
        Ok(response)
    }

    /// Parse the most recent assistant response only
    pub fn extract_profile(&self) -> Result<LlmFields, ExtractionError> {
        if self.last_response.is_empty() {
            return Err(ExtractionError::EmptyResponse);
        }
        extract_fields(&self.last_response)
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    pub fn last_response(&self) -> Option<&str> {
        (!self.last_response.is_empty()).then_some(self.last_response.as_str())
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses and records every request
    #[derive(Default)]
    struct ScriptedClient {
        responses: Mutex<VecDeque<anyhow::Result<String>>>,
        requests: Mutex<Vec<(String, Vec<ChatMessage>, String)>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<anyhow::Result<String>>) -> Self {
            Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionClient for ScriptedClient {
        async fn complete(
            &self,
            system_prompt: &str,
            history: &[ChatMessage],
            user_text: &str,
        ) -> anyhow::Result<String> {
            self.requests.lock().unwrap().push((
                system_prompt.to_string(),
                history.to_vec(),
                user_text.to_string(),
            ));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no scripted response")))
        }
    }

    #[test]
    fn test_build_system_prompt() {
        let mut cluster = ClusterConfig::default();
        cluster.capabilities.nodes.sriov = Some(true);

        let prompt = build_system_prompt(
            "You are a networking assistant.\n",
            &["Network operator notes.".to_string(), "  ".to_string()],
            &cluster,
        )
        .unwrap();

        assert!(prompt.starts_with("You are a networking assistant.\n\nNetwork operator notes.\n"));
        assert!(prompt.ends_with(r#"{"capabilities":{"nodes":{"sriov":true}}}"#));
    }

    #[tokio::test]
    async fn test_select_profile() {
        let client = ScriptedClient::new(vec![Ok(
            "```json\n{\"fabric\": \"ethernet\", \"multirail\": true, \"confidence\": \"high\"}\n```"
                .to_string(),
        )]);

        let fields = select_profile(&RunContext::silent(), &client, "system", "I need SR-IOV")
            .await
            .unwrap();
        assert_eq!(fields["fabric"], "ethernet");
        assert_eq!(fields["multirail"], "true");

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].1.is_empty());
        assert_eq!(requests[0].2, "I need SR-IOV");
    }

    #[tokio::test]
    async fn test_select_profile_low_confidence() {
        let client = ScriptedClient::new(vec![Ok(
            r#"{"confidence": "low", "reasoning": "fabric is unclear"}"#.to_string(),
        )]);

        let err = select_profile(&RunContext::silent(), &client, "system", "fast network")
            .await
            .unwrap_err();
        match err {
            LaunchError::LowConfidence { reasoning } => assert_eq!(reasoning, "fabric is unclear"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_select_profile_client_failure() {
        let client = ScriptedClient::new(vec![Err(anyhow::anyhow!("rate limited"))]);
        let err = select_profile(&RunContext::silent(), &client, "system", "prompt")
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::Llm(_)));
        assert!(err.to_string().contains("rate limited"));
    }

    #[tokio::test]
    async fn test_session_resends_full_history() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok("What fabric do you use?".to_string()),
            Ok(r#"{"fabric": "infiniband"}"#.to_string()),
        ]));
        let mut session = ChatSession::new(client.clone(), "system prompt");
        let ctx = RunContext::silent();

        assert!(matches!(
            session.extract_profile().unwrap_err(),
            ExtractionError::EmptyResponse
        ));

        session.send_message(&ctx, "I want RDMA").await.unwrap();
        let reply = session.send_message(&ctx, "InfiniBand").await.unwrap();
        assert_eq!(reply, r#"{"fabric": "infiniband"}"#);

        let requests = client.requests.lock().unwrap();
        assert_eq!(requests[0].0, "system prompt");
        assert!(requests[0].1.is_empty());
        assert_eq!(requests[1].0, "system prompt");
        assert_eq!(
            requests[1].1,
            vec![
                ChatMessage::user("I want RDMA"),
                ChatMessage::assistant("What fabric do you use?"),
            ]
        );
        assert_eq!(requests[1].2, "InfiniBand");

        assert_eq!(session.history().len(), 4);
        assert_eq!(session.history()[3].role, Role::Assistant);
        assert_eq!(session.extract_profile().unwrap()["fabric"], "infiniband");
    }

    #[tokio::test]
    async fn test_extract_reads_only_last_response() {
        let client = Arc::new(ScriptedClient::new(vec![
            Ok(r#"{"fabric": "ethernet"}"#.to_string()),
            Ok("Could you tell me more?".to_string()),
        ]));
        let mut session = ChatSession::new(client, "system");
        let ctx = RunContext::silent();

        session.send_message(&ctx, "first").await.unwrap();
        session.send_message(&ctx, "second").await.unwrap();

        assert!(matches!(
            session.extract_profile().unwrap_err(),
            ExtractionError::NoJson
        ));
    }

    #[tokio::test]
    async fn test_failed_send_keeps_user_turn() {
        let client = Arc::new(ScriptedClient::new(vec![Err(anyhow::anyhow!("timeout"))]));
        let mut session = ChatSession::new(client, "system");

        let err = session
            .send_message(&RunContext::silent(), "hello")
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::Llm(_)));
        assert_eq!(session.history(), &[ChatMessage::user("hello")]);
        assert!(session.last_response().is_none());
    }
}
