//! Async driver: presents prompts to an operator until the session completes.

use crate::model::ResultVector;
use crate::session::{Checkpoint, Decision, Prompt, Session, Step};
use crate::{Error, Result};
use storage::EventStore;
use tracing::{debug, warn};

/// Whoever answers prompts: a terminal, a UI, a test script.
pub trait Operator: Send {
    /// Answer the prompt, or `None` to abandon the session.
    fn decide(&mut self, prompt: &Prompt) -> impl Future<Output = Option<Decision>> + Send;
}

/// Somewhere to persist session state between decisions.
pub trait CheckpointSink: Send + Sync {
    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;
}

impl CheckpointSink for EventStore {
    fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.save_checkpoint(checkpoint.session, &serde_json::to_value(checkpoint)?)?;
        Ok(())
    }
}

/// Run a session to completion.
///
/// Out-of-order decisions are logged and the same prompt is presented again.
/// A checkpoint is saved before every prompt and once more at the end.
pub async fn drive<O: Operator>(
    session: &mut Session,
    operator: &mut O,
    checkpoints: Option<&dyn CheckpointSink>,
) -> Result<ResultVector> {
    let mut step = session.next();
    loop {
        if let Some(sink) = checkpoints {
            sink.save(&session.checkpoint())?;
        }
        let prompt = match step {
            Step::Complete(result) => return Ok(result),
            Step::Prompt(prompt) => prompt,
        };
        debug!(session = %session.id, unit = %prompt.unit, index = prompt.index, "presenting prompt");

        step = match operator.decide(&prompt).await {
            None => Step::Complete(session.abandon()),
            Some(decision) => match session.decide(decision) {
                Ok(next) => next,
                Err(Error::Protocol(violation)) => {
                    warn!(session = %session.id, %violation, "decision rejected");
                    Step::Prompt(prompt)
                }
                Err(e) => return Err(e),
            },
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;
    use crate::grants::MemoryGrantStore;
    use crate::model::{CapabilityId, Outcome};
    use crate::session::Context;
    use policy::{DevicePolicy, PolicyDirective};
    use std::collections::VecDeque;
    use std::sync::Arc;

    const CATALOG: &str = r#"
[[group]]
name = "CAMERA"

[[group]]
name = "MICROPHONE"

[[capability]]
id = "CAM"
group = "CAMERA"
protection = "dangerous"

[[capability]]
id = "MIC"
group = "MICROPHONE"
protection = "dangerous"

[[application]]
id = "app"
model_version = 30
declares = ["CAM", "MIC"]
"#;

    struct Script {
        answers: VecDeque<Decision>,
        seen: Vec<String>,
    }

    impl Operator for Script {
        async fn decide(&mut self, prompt: &Prompt) -> Option<Decision> {
            self.seen.push(prompt.unit.clone());
            self.answers.pop_front()
        }
    }

    fn session(store: Arc<EventStore>) -> Session {
        let catalog = Arc::new(Catalog::parse(CATALOG).unwrap());
        let ctx = Context::new(
            catalog.clone(),
            catalog,
            Arc::new(DevicePolicy::new(PolicyDirective::None)),
            Arc::new(MemoryGrantStore::new()),
            store,
        );
        Session::open(ctx, "app", vec![CapabilityId::from("CAM"), "MIC".into()])
    }

    #[tokio::test]
    async fn rejected_decision_re_presents_prompt() {
        let store = Arc::new(EventStore::in_memory().unwrap());
        let mut session = session(store);
        let mut script = Script {
            answers: VecDeque::from([
                Decision::grant("MICROPHONE"),
                Decision::grant("CAMERA"),
                Decision::deny("MICROPHONE"),
            ]),
            seen: Vec::new(),
        };

        let result = drive(&mut session, &mut script, None).await.unwrap();
        assert_eq!(script.seen, vec!["CAMERA", "CAMERA", "MICROPHONE"]);
        assert_eq!(result.outcomes(), vec![Outcome::Granted, Outcome::Denied]);
    }

    #[tokio::test]
    async fn operator_walking_away_abandons_session() {
        let store = Arc::new(EventStore::in_memory().unwrap());
        let mut session = session(store.clone());
        let mut script = Script {
            answers: VecDeque::new(),
            seen: Vec::new(),
        };

        let sink: &dyn CheckpointSink = &*store;
        let result = drive(&mut session, &mut script, Some(sink)).await.unwrap();
        assert_eq!(result.outcomes(), vec![Outcome::Denied, Outcome::Denied]);

        let saved: Checkpoint =
            serde_json::from_value(store.load_checkpoint(session.id).unwrap()).unwrap();
        assert_eq!(saved.result, Some(result));
    }
}
