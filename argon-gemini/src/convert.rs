use argon_core::{GeoPoint, StreamChunk, StreamOptions, Tool};
use serde_json::{Value, json};

use crate::error::GeminiError;
use crate::types::Content;

/// Converts a history turn to Gemini JSON format.
fn content_to_json(content: &Content) -> Value {
    json!({
        "role": content.role.as_str(),
        "parts": [{ "text": content.text }]
    })
}

fn tools_to_json(tool: Tool) -> Option<Value> {
    match tool {
        Tool::None => None,
        Tool::Search => Some(json!([{ "googleSearch": {} }])),
        Tool::Places => Some(json!([{ "googleMaps": {} }])),
    }
}

fn tool_config_to_json(point: &GeoPoint) -> Value {
    json!({
        "retrievalConfig": {
            "latLng": {
                "latitude": point.latitude,
                "longitude": point.longitude
            }
        }
    })
}

/// Builds the body of a `streamGenerateContent` request.
///
/// `history` is sent first, followed by `turn`.
pub fn build_request_body(
    history: &[Content],
    turn: &Content,
    options: &StreamOptions,
    system_instruction: &str,
) -> Value {
    let contents: Vec<Value> = history
        .iter()
        .chain(std::iter::once(turn))
        .map(content_to_json)
        .collect();

    let mut body = json!({ "contents": contents });

    if !system_instruction.is_empty() {
        body["systemInstruction"] = json!({
            "parts": [{ "text": system_instruction }]
        });
    }

    if let Some(tools) = tools_to_json(options.tool) {
        body["tools"] = tools;
        // A location only makes sense for the maps tool.
        if options.tool == Tool::Places {
            if let Some(point) = &options.tool_context {
                body["toolConfig"] = tool_config_to_json(point);
            }
        }
    }

    body
}

/// Extracts the error carried by a Gemini error body, if any.
pub fn parse_error(body: &Value, status: u16) -> Option<GeminiError> {
    let error = body.get("error")?;
    let message = error
        .get("message")
        .and_then(|m| m.as_str())
        .unwrap_or("Unknown error")
        .to_string();
    let status = error
        .get("code")
        .and_then(|c| c.as_u64())
        .and_then(|c| u16::try_from(c).ok())
        .unwrap_or(status);
    Some(GeminiError::Api { status, message })
}

fn push_unique(urls: &mut Vec<String>, uri: Option<&Value>) {
    if let Some(uri) = uri.and_then(|u| u.as_str()) {
        if !urls.iter().any(|u| u == uri) {
            urls.push(uri.to_string());
        }
    }
}

/// Collects review snippet links from `placeAnswerSources`, which is reported
/// either as a single object or as a list of them.
fn collect_review_uris(sources: &Value, urls: &mut Vec<String>) {
    let sources = match sources {
        Value::Array(items) => items.iter().collect::<Vec<_>>(),
        other => vec![other],
    };
    for source in sources {
        let Some(snippets) = source.get("reviewSnippets").and_then(|s| s.as_array()) else {
            continue;
        };
        for snippet in snippets {
            push_unique(urls, snippet.get("uri"));
        }
    }
}

/// Parses one streamed response object into a chunk.
pub fn parse_chunk(response: &Value) -> Result<StreamChunk, GeminiError> {
    if let Some(err) = parse_error(response, 0) {
        return Err(err);
    }

    let Some(candidate) = response.get("candidates").and_then(|c| c.get(0)) else {
        return Ok(StreamChunk::default());
    };

    let mut text: Option<String> = None;
    if let Some(parts) = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array())
    {
        for part in parts {
            let is_thought = part
                .get("thought")
                .and_then(|t| t.as_bool())
                .unwrap_or(false);
            if is_thought {
                continue;
            }
            if let Some(fragment) = part.get("text").and_then(|t| t.as_str()) {
                text.get_or_insert_with(String::new).push_str(fragment);
            }
        }
    }

    let mut citations = Vec::new();
    if let Some(chunks) = candidate
        .get("groundingMetadata")
        .and_then(|g| g.get("groundingChunks"))
        .and_then(|c| c.as_array())
    {
        for chunk in chunks {
            if let Some(web) = chunk.get("web") {
                push_unique(&mut citations, web.get("uri"));
            }
            if let Some(maps) = chunk.get("maps") {
                push_unique(&mut citations, maps.get("uri"));
                if let Some(sources) = maps.get("placeAnswerSources") {
                    collect_review_uris(sources, &mut citations);
                }
            }
        }
    }

    Ok(StreamChunk { text, citations })
}
