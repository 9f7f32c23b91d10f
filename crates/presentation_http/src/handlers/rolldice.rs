//! Dice rolling handlers

use axum::{Json, extract::Path};
use opentelemetry::{
    KeyValue,
    trace::{Span, Tracer},
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{error::ApiError, middleware::RequestTelemetry};

/// Longest accepted player name, in characters
pub const MAX_PLAYER_NAME_CHARS: usize = 64;

/// Result of a single roll
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub player: Option<String>,
    pub roll: u8,
}

/// Roll for an anonymous player
pub async fn roll_dice(telemetry: RequestTelemetry) -> Json<RollResponse> {
    Json(roll(&telemetry, None))
}

/// Roll for a named player
pub async fn roll_dice_for_player(
    telemetry: RequestTelemetry,
    Path(player): Path<String>,
) -> Result<Json<RollResponse>, ApiError> {
    validate_player(&player)?;
    Ok(Json(roll(&telemetry, Some(player))))
}

fn validate_player(player: &str) -> Result<(), ApiError> {
    if player.chars().count() > MAX_PLAYER_NAME_CHARS {
        return Err(ApiError::BadRequest(format!(
            "Player name must be at most {MAX_PLAYER_NAME_CHARS} characters"
        )));
    }
    Ok(())
}

fn roll(telemetry: &RequestTelemetry, player: Option<String>) -> RollResponse {
    let mut span = telemetry
        .tracer()
        .start_with_context("roll", telemetry.context());

    let value = rand::rng().random_range(1..=6u8);
    span.set_attribute(KeyValue::new("roll.value", i64::from(value)));

    match &player {
        Some(name) => info!(player = %name, result = value, "{name} is rolling the dice"),
        None => info!(result = value, "Anonymous player is rolling the dice"),
    }

    span.end();
    RollResponse {
        player,
        roll: value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn player_name_at_limit_is_accepted() {
        let name = "é".repeat(MAX_PLAYER_NAME_CHARS);
        assert!(validate_player(&name).is_ok());
    }

    #[test]
    fn player_name_over_limit_is_rejected() {
        let name = "a".repeat(MAX_PLAYER_NAME_CHARS + 1);
        assert!(matches!(validate_player(&name), Err(ApiError::BadRequest(_))));
    }

    #[test]
    fn anonymous_roll_omits_player() {
        let response = RollResponse {
            player: None,
            roll: 4,
        };
        assert_eq!(serde_json::to_string(&response).unwrap(), r#"{"roll":4}"#);
    }

    #[test]
    fn named_roll_includes_player() {
        let response = RollResponse {
            player: Some("alice".to_string()),
            roll: 6,
        };
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"player":"alice","roll":6}"#
        );
    }
}
