use serde_json::{json, Value};
use timekeep_core::ipc::{TimekeepRequest, TimekeepResponse, METHODS};
use timekeep_core::storage::Storage;

use crate::facade::StorageFacade;

/// Dispatch one call against the facade. `Quit` and `Subscribe` change the
/// service or the connection and are handled before they get here.
pub async fn handle_request<S: Storage>(
    request: TimekeepRequest,
    facade: &StorageFacade<S>,
) -> TimekeepResponse {
    let method = request.method();
    match dispatch(request, facade).await {
        Ok(data) => TimekeepResponse::ok(data),
        Err(e) => {
            tracing::warn!("{} failed: {}", method, e);
            TimekeepResponse::err(e.to_string())
        }
    }
}

async fn dispatch<S: Storage>(
    request: TimekeepRequest,
    facade: &StorageFacade<S>,
) -> anyhow::Result<Value> {
    let method = request.method();
    let data = match request {
        TimekeepRequest::Ping => return Ok(json!({"pong": true})),
        TimekeepRequest::Introspect => serde_json::to_value(METHODS)?,
        TimekeepRequest::Subscribe | TimekeepRequest::Quit => {
            anyhow::bail!("{} is handled by the service loop", method)
        }

        TimekeepRequest::AddFact {
            fact,
            start_time,
            end_time,
            temporary,
        } => json!(facade.add_fact(&fact, start_time, end_time, temporary).await?),
        TimekeepRequest::GetFact { fact_id } => serde_json::to_value(facade.get_fact(fact_id).await?)?,
        TimekeepRequest::UpdateFact {
            fact_id,
            fact,
            start_time,
            end_time,
            temporary,
        } => json!(
            facade
                .update_fact(fact_id, &fact, start_time, end_time, temporary)
                .await?
        ),
        TimekeepRequest::StopTracking { end_time } => json!(facade.stop_tracking(end_time).await?),
        TimekeepRequest::RemoveFact { fact_id } => json!(facade.remove_fact(fact_id).await?),
        TimekeepRequest::GetFacts {
            start_date,
            end_date,
            search_terms,
            reverse_search_terms,
        } => serde_json::to_value(
            facade
                .get_facts(start_date, end_date, &search_terms, reverse_search_terms)
                .await?,
        )?,
        TimekeepRequest::GetTodaysFacts => serde_json::to_value(facade.get_todays_facts().await?)?,

        TimekeepRequest::AddCategory { name } => json!(facade.add_category(&name).await?),
        TimekeepRequest::GetCategoryId { category } => {
            json!(facade.get_category_id(&category).await?)
        }
        TimekeepRequest::UpdateCategory { id, name } => {
            facade.update_category(id, &name).await?;
            Value::Null
        }
        TimekeepRequest::RemoveCategory { id } => {
            facade.remove_category(id).await?;
            Value::Null
        }
        TimekeepRequest::GetCategories => json!(facade.get_categories().await?),

        TimekeepRequest::AddActivity { name, category_id } => {
            json!(facade.add_activity(&name, category_id).await?)
        }
        TimekeepRequest::UpdateActivity {
            id,
            name,
            category_id,
        } => {
            facade.update_activity(id, &name, category_id).await?;
            Value::Null
        }
        TimekeepRequest::RemoveActivity { id } => json!(facade.remove_activity(id).await?),
        TimekeepRequest::GetCategoryActivities { category_id } => {
            json!(facade.get_category_activities(category_id).await?)
        }
        TimekeepRequest::GetActivities { search } => json!(facade.get_activities(&search).await?),
        TimekeepRequest::ChangeCategory { id, category_id } => {
            json!(facade.change_category(id, category_id).await?)
        }
        TimekeepRequest::GetActivityByName {
            activity,
            category_id,
            resurrect,
        } => Value::Object(
            facade
                .get_activity_by_name(&activity, category_id, resurrect)
                .await?,
        ),

        TimekeepRequest::GetTags { only_autocomplete } => {
            json!(facade.get_tags(only_autocomplete).await?)
        }
        TimekeepRequest::GetTagIds { tags } => json!(facade.get_tag_ids(&tags).await?),
        TimekeepRequest::SetTagsAutocomplete { tags } => {
            facade.set_tags_autocomplete(&tags).await?;
            Value::Null
        }

        TimekeepRequest::Toggle => {
            facade.toggle();
            Value::Null
        }
    };
    Ok(data)
}
