//! User recognition.
//!
//! Events arriving before a user is identified are remembered in the
//! process-wide anonymous events store. When an identified event with the
//! same anonymous id shows up, the remembered events are re-emitted with
//! the user id filled in, ahead of the identified event.

use async_trait::async_trait;

use super::{BuiltinContext, BuiltinFunction, FunctionOutcome, FunctionResult};
use crate::domain::AnalyticsEvent;

pub struct UserRecognition;

#[async_trait]
impl BuiltinFunction for UserRecognition {
    async fn exec(&self, event: AnalyticsEvent, ctx: BuiltinContext) -> FunctionResult {
        let Some(anonymous_id) = event.anonymous_id() else {
            return Ok(FunctionOutcome::Event(event));
        };

        let workspace_id = &ctx.system.metrics_meta.workspace_id;
        let anonymous = &ctx.system.anonymous_events_store;

        let Some(user_id) = event.user_id() else {
            anonymous
                .add_event(workspace_id, &anonymous_id, &event)
                .await?;
            return Ok(FunctionOutcome::Event(event));
        };

        let mut recognized = anonymous.take_events(workspace_id, &anonymous_id).await?;
        if recognized.is_empty() {
            return Ok(FunctionOutcome::Event(event));
        }

        let traits = event.traits().cloned();
        for past in recognized.iter_mut() {
            past.set_user_id(&user_id);
            if let Some(traits) = &traits {
                past.set_traits(traits.clone());
            }
        }

        ctx.function
            .log
            .info(format!(
                "Recognized {} anonymous events as user {}",
                recognized.len(),
                user_id
            ))
            .await;

        recognized.push(event);
        Ok(FunctionOutcome::Events(recognized))
    }
}
