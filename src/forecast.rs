use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{
    BACKCAST_DAYS, FALLBACK_TARGET_MULTIPLIER, FORECAST_HORIZON_DAYS, NARRATIVE_ENDPOINT,
    NARRATIVE_MODEL, TARGET_SANITY_FACTOR,
};
use crate::data::Candle;
use crate::error::ForecastError;

/// Seam for the hosted text-completion call, so tests can script replies.
#[async_trait]
pub trait NarrativeProvider: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, ForecastError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Debug, Serialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    content: String,
}

/// Production provider: an OpenAI-compatible chat-completions endpoint
/// hosted by Groq. Bounded retry with doubling backoff.
pub struct GroqProvider {
    api_key: String,
    client: reqwest::Client,
}

impl GroqProvider {
    pub fn new(api_key: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { api_key, client }
    }

    async fn call_once(&self, request: &ChatRequest) -> Result<String, ForecastError> {
        let response = self
            .client
            .post(NARRATIVE_ENDPOINT)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(request)
            .send()
            .await
            .map_err(|e| ForecastError::Network(e.to_string()))?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ForecastError::RateLimited);
        }
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(ForecastError::Api(status.as_u16(), body));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| ForecastError::Network(e.to_string()))?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or(ForecastError::NoTarget)
    }
}

#[async_trait]
impl NarrativeProvider for GroqProvider {
    async fn complete(&self, prompt: &str) -> Result<String, ForecastError> {
        let request = ChatRequest {
            model: NARRATIVE_MODEL.to_string(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: "You are a market commentary assistant. Answer with a single \
                              plausible price number and nothing else."
                        .to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: prompt.to_string(),
                },
            ],
            max_tokens: 50,
            temperature: 0.7,
        };

        let max_retries = 3;
        let mut delay = Duration::from_secs(1);
        for attempt in 1..=max_retries {
            match self.call_once(&request).await {
                Ok(text) => return Ok(text),
                Err(err) if attempt < max_retries => {
                    warn!(
                        "narrative model call failed (attempt {}/{}): {}. Retrying in {:?}...",
                        attempt, max_retries, err, delay
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(err) => return Err(err),
            }
        }
        unreachable!("retry loop returns on final attempt")
    }
}

/// Where the target number came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetSource {
    Model,
    Heuristic,
}

impl TargetSource {
    pub fn as_str(self) -> &'static str {
        match self {
            TargetSource::Model => "model",
            TargetSource::Heuristic => "heuristic",
        }
    }
}

/// A straight-line visualization anchored by a single target price.
/// Illustrative only; carries no statistical meaning.
#[derive(Clone, Debug)]
pub struct ForecastPath {
    pub symbol: String,
    pub spot: f64,
    pub target: f64,
    pub source: TargetSource,
    /// Day offset (0 = today) and price, spot to target inclusive.
    pub projection: Vec<(f64, f64)>,
    /// Negative day offsets ending at (0, spot); the visual back-cast line.
    pub backcast: Vec<(f64, f64)>,
}

impl ForecastPath {
    pub fn target_change_pct(&self) -> f64 {
        if self.spot.abs() > 1e-9 {
            (self.target / self.spot - 1.0) * 100.0
        } else {
            0.0
        }
    }
}

/// Pulls the first numeric token out of free text. Accepts an optional `$`,
/// thousands separators, and decimals.
pub fn extract_target_price(text: &str) -> Option<f64> {
    let mut token = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            token.push(c);
            while let Some(&next) = chars.peek() {
                if next.is_ascii_digit() || next == ',' || next == '.' {
                    token.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            let cleaned: String = token
                .trim_end_matches(['.', ','])
                .chars()
                .filter(|&c| c != ',')
                .collect();
            if let Ok(value) = cleaned.parse::<f64>() {
                return Some(value);
            }
            token.clear();
        }
    }
    None
}

fn linear_path(start_day: f64, start_price: f64, end_day: f64, end_price: f64) -> Vec<(f64, f64)> {
    let steps = (end_day - start_day).abs().round() as usize;
    if steps == 0 {
        return vec![(end_day, end_price)];
    }
    (0..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            (
                start_day + (end_day - start_day) * t,
                start_price + (end_price - start_price) * t,
            )
        })
        .collect()
}

fn plausible_target(target: f64, spot: f64) -> bool {
    target.is_finite()
        && target > 0.0
        && spot > 0.0
        && target <= spot * TARGET_SANITY_FACTOR
        && target >= spot / TARGET_SANITY_FACTOR
}

/// Builds the forecast path for a symbol. Every failure mode (no key,
/// network, unparseable reply, implausible number) degrades to the fixed
/// heuristic target; this function itself never fails.
pub async fn build_forecast(
    symbol: &str,
    spot: f64,
    recent: &[Candle],
    provider: Option<&dyn NarrativeProvider>,
) -> ForecastPath {
    let (target, source) = match provider {
        Some(provider) => {
            let prompt = format!(
                "{} trades at {:.2} today. Give one plausible price for it {} days from now.",
                symbol, spot, FORECAST_HORIZON_DAYS
            );
            match provider.complete(&prompt).await {
                Ok(text) => match extract_target_price(&text) {
                    Some(value) if plausible_target(value, spot) => {
                        info!("{}: model target {:.2}", symbol, value);
                        (value, TargetSource::Model)
                    }
                    Some(value) => {
                        warn!(
                            "{}: discarding implausible model target {:.2} (spot {:.2})",
                            symbol, value, spot
                        );
                        (spot * FALLBACK_TARGET_MULTIPLIER, TargetSource::Heuristic)
                    }
                    None => {
                        warn!("{}: no numeric token in model reply", symbol);
                        (spot * FALLBACK_TARGET_MULTIPLIER, TargetSource::Heuristic)
                    }
                },
                Err(err) => {
                    warn!("{}: narrative model unavailable: {}", symbol, err);
                    (spot * FALLBACK_TARGET_MULTIPLIER, TargetSource::Heuristic)
                }
            }
        }
        None => (spot * FALLBACK_TARGET_MULTIPLIER, TargetSource::Heuristic),
    };

    let projection = linear_path(0.0, spot, FORECAST_HORIZON_DAYS as f64, target);

    // Back-cast: straight line from the close BACKCAST_DAYS ago to today's
    // spot, purely for the visual framing.
    let lookback = recent.len().min(BACKCAST_DAYS + 1);
    let backcast = if lookback >= 2 {
        let anchor = &recent[recent.len() - lookback];
        linear_path(-((lookback - 1) as f64), anchor.close, 0.0, spot)
    } else {
        Vec::new()
    };

    ForecastPath {
        symbol: symbol.to_string(),
        spot,
        target,
        source,
        projection,
        backcast,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::StockData;

    struct ScriptedProvider(Result<&'static str, ()>);

    #[async_trait]
    impl NarrativeProvider for ScriptedProvider {
        async fn complete(&self, _prompt: &str) -> Result<String, ForecastError> {
            self.0
                .map(|s| s.to_string())
                .map_err(|_| ForecastError::Network("scripted failure".into()))
        }
    }

    #[test]
    fn extracts_first_number_in_free_text() {
        assert_eq!(extract_target_price("$123.45 seems fair"), Some(123.45));
        assert_eq!(
            extract_target_price("I'd expect around 1,250 by then."),
            Some(1250.0)
        );
        assert_eq!(extract_target_price("Roughly 98"), Some(98.0));
        assert_eq!(extract_target_price("price: 42."), Some(42.0));
        assert_eq!(extract_target_price("no idea, sorry"), None);
        assert_eq!(extract_target_price(""), None);
    }

    #[test]
    fn projection_spans_spot_to_target() {
        let path = linear_path(0.0, 100.0, 30.0, 130.0);
        assert_eq!(path.len(), 31);
        assert_eq!(path[0], (0.0, 100.0));
        let (last_day, last_price) = *path.last().unwrap();
        assert!((last_day - 30.0).abs() < 1e-9);
        assert!((last_price - 130.0).abs() < 1e-9);
        // Midpoint of a straight line.
        assert!((path[15].1 - 115.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn model_target_drives_projection() {
        let provider = ScriptedProvider(Ok("My answer is $220.50"));
        let history = StockData::new_mock("AAPL", 60).history;
        let path = build_forecast("AAPL", 200.0, &history, Some(&provider)).await;

        assert_eq!(path.source, TargetSource::Model);
        assert!((path.target - 220.5).abs() < 1e-9);
        assert_eq!(path.projection.len(), FORECAST_HORIZON_DAYS + 1);
        assert!(!path.backcast.is_empty());
        assert_eq!(*path.backcast.last().unwrap(), (0.0, 200.0));
    }

    #[tokio::test]
    async fn provider_failure_falls_back_to_heuristic() {
        let provider = ScriptedProvider(Err(()));
        let path = build_forecast("AAPL", 200.0, &[], Some(&provider)).await;
        assert_eq!(path.source, TargetSource::Heuristic);
        assert!((path.target - 200.0 * FALLBACK_TARGET_MULTIPLIER).abs() < 1e-9);
        assert!(path.backcast.is_empty());
    }

    #[tokio::test]
    async fn unparseable_reply_falls_back() {
        let provider = ScriptedProvider(Ok("it will go up, probably"));
        let path = build_forecast("AAPL", 100.0, &[], Some(&provider)).await;
        assert_eq!(path.source, TargetSource::Heuristic);
    }

    #[tokio::test]
    async fn implausible_target_is_discarded() {
        // "30 days" style numbers leaking into the reply must not anchor the
        // line when they are nowhere near spot.
        let provider = ScriptedProvider(Ok("in 30000 days"));
        let path = build_forecast("AAPL", 100.0, &[], Some(&provider)).await;
        assert_eq!(path.source, TargetSource::Heuristic);
        assert!((path.target - 105.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn no_provider_means_heuristic() {
        let path = build_forecast("JEPI", 55.0, &[], None).await;
        assert_eq!(path.source, TargetSource::Heuristic);
        assert!((path.target_change_pct() - 5.0).abs() < 1e-6);
    }
}
