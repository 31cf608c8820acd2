//! Google Chat Cards v2 message formatting.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::alert::Alert;
use crate::error::FormatError;

/// Google Chat rejects messages larger than this.
pub const MAX_MESSAGE_BYTES: usize = 32_000;

const CARD_ID: &str = "alert-card";
const HEADER_IMAGE_URL: &str = "https://grafana.com/static/assets/img/fav32.png";
const LABEL_ICON: &str = "DESCRIPTION";

/// Labels left out of the Grafana log selector.
const EXCLUDED_LABELS: [&str; 2] = ["alertname", "severity"];

/// Half-width of the Grafana Explore time range.
const EXPLORE_WINDOW_MINUTES: i64 = 5;

/// Build the messages for one alert.
pub fn prepare_messages(alert: &Alert) -> Result<Vec<ChatMessage>, FormatError> {
    prepare_messages_at(alert, Utc::now())
}

/// Build the messages for one alert as of `now`.
pub fn prepare_messages_at(
    alert: &Alert,
    now: DateTime<Utc>,
) -> Result<Vec<ChatMessage>, FormatError> {
    let title = alert
        .annotation("title")
        .or_else(|| alert.annotation("summary"))
        .or_else(|| alert.name().filter(|n| !n.is_empty()))
        .ok_or_else(|| FormatError::MissingTitle {
            fingerprint: alert.fingerprint.clone(),
        })?;

    let icon = if alert.is_firing() { "🔥" } else { "✅" };

    let mut widgets = Vec::new();
    if let Some(url) = grafana_explore_url(alert, now) {
        widgets.push(Widget::button("Grafana", url));
    }

    let mut labels: Vec<_> = alert.labels.iter().collect();
    labels.sort();
    for (key, value) in labels {
        widgets.push(Widget::label(format!("{key}: {value}")));
    }

    let message = ChatMessage {
        cards_v2: vec![CardV2 {
            card_id: CARD_ID.to_string(),
            card: Card {
                header: Header {
                    title: format!("{icon} {title}"),
                    subtitle: alert.annotation("description").unwrap_or_default().to_string(),
                    image_url: HEADER_IMAGE_URL.to_string(),
                },
                sections: vec![Section {
                    header: "Summary".to_string(),
                    collapsible: true,
                    uncollapsible_widgets_count: 1,
                    widgets,
                }],
            },
        }],
    };

    let size = serde_json::to_vec(&message)?.len();
    if size > MAX_MESSAGE_BYTES {
        return Err(FormatError::TooLarge {
            fingerprint: alert.fingerprint.clone(),
            size,
            limit: MAX_MESSAGE_BYTES,
        });
    }

    Ok(vec![message])
}

/// Link to the alert's error logs in Grafana Explore.
///
/// Requires both `grafanaURL` and `grafanaDS` annotations.
pub fn grafana_explore_url(alert: &Alert, now: DateTime<Utc>) -> Option<String> {
    let base = alert.annotation("grafanaURL")?;
    let datasource = alert.annotation("grafanaDS")?;

    let mut parts: Vec<String> = alert
        .labels
        .iter()
        .filter(|(key, _)| !EXCLUDED_LABELS.contains(&key.as_str()))
        .map(|(key, value)| format!(r#"{key}=\"{value}\""#))
        .collect();
    parts.sort();

    let selector = format!("{{{}}}", parts.join(","));
    let query = format!("{}  |~ `(?i)error`", urlencoding::encode(&selector));

    let window = Duration::minutes(EXPLORE_WINDOW_MINUTES);
    let from = (now - window).timestamp_millis();
    let to = (now + window).timestamp_millis();

    let panes = format!(
        r#"{{"xph":{{"datasource":"{datasource}","queries":[{{"refId":"A","expr":"{query}","queryType":"range","datasource":{{"type":"loki","uid":"{datasource}"}},"editorMode":"code"}}],"range":{{"from":"{from}","to":"{to}"}}}}}}"#
    );
    let url = format!(
        "{}/explore?schemaVersion=1&panes={panes}&orgId=1",
        base.trim_end_matches('/')
    );

    Some(url.replace('"', "%22"))
}

// =============================================================================
// Google Chat API types
// =============================================================================

/// A Google Chat webhook message.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub cards_v2: Vec<CardV2>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CardV2 {
    pub card_id: String,
    pub card: Card,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    pub header: Header,
    pub sections: Vec<Section>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Header {
    pub title: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub subtitle: String,
    pub image_url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub header: String,
    pub collapsible: bool,
    pub uncollapsible_widgets_count: u32,
    pub widgets: Vec<Widget>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub button_list: Option<ButtonList>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decorated_text: Option<DecoratedText>,
}

impl Widget {
    fn button(text: &str, url: String) -> Self {
        Self {
            button_list: Some(ButtonList {
                buttons: vec![Button {
                    text: text.to_string(),
                    on_click: OnClick {
                        open_link: OpenLink { url },
                    },
                }],
            }),
            decorated_text: None,
        }
    }

    fn label(text: String) -> Self {
        Self {
            button_list: None,
            decorated_text: Some(DecoratedText {
                start_icon: StartIcon {
                    known_icon: LABEL_ICON.to_string(),
                },
                text,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ButtonList {
    pub buttons: Vec<Button>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Button {
    pub text: String,
    pub on_click: OnClick,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnClick {
    pub open_link: OpenLink,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OpenLink {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecoratedText {
    pub start_icon: StartIcon,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartIcon {
    pub known_icon: String,
}
