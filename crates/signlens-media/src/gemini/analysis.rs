use base64::Engine;
use serde_json::{Value, json};

use signlens_types::{AnalysisError, BusinessRecord, CapturedImage};

use super::CallError;

/// Instruction text sent alongside the signboard photo.
pub fn analysis_prompt(locality_hint: &str) -> String {
    let location = if locality_hint.trim().is_empty() {
        "Unknown"
    } else {
        locality_hint
    };
    format!(
        "Analyze this image of a business or storefront.
Context: The user is at location: {location}.

Tasks:
1. Identify the Business Name.
2. Detect the primary language(s) on the board (e.g., Hindi, Tamil, Telugu, Kannada, Bengali, Marathi, Gujarati).
3. If the text is in a native script, provide a Transliteration (Roman script) for the business name and key text.
4. Categorize the business (e.g., Restaurant, Kirana Store, Pharmacy).
5. Extract any visible Products and Prices.
6. Look for address clues (city, area) in the text.
7. Write a short, viral-style summary (1 sentence) about this spot.

Return the data in strict JSON format."
    )
}

fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "businessName": { "type": "STRING" },
            "detectedLanguage": { "type": "STRING", "description": "Primary language detected" },
            "transliteration": { "type": "STRING", "description": "Romanized version of the main native text" },
            "category": { "type": "STRING" },
            "confidence": { "type": "NUMBER", "description": "Confidence score 0-100" },
            "products": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "price": { "type": "STRING" },
                        "category": { "type": "STRING" }
                    }
                }
            },
            "addressContext": { "type": "STRING", "description": "City or area inferred from image text" },
            "summary": { "type": "STRING", "description": "A catchy 1-sentence summary" }
        },
        "required": ["businessName", "detectedLanguage", "category", "summary"]
    })
}

/// `generateContent` body: inline JPEG, prompt, JSON response schema.
pub fn analysis_request_body(image: &CapturedImage, locality_hint: &str) -> Value {
    let data = base64::engine::general_purpose::STANDARD.encode(image.bytes());
    json!({
        "contents": [{
            "parts": [
                { "inlineData": { "mimeType": image.mime_type(), "data": data } },
                { "text": analysis_prompt(locality_hint) }
            ]
        }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": response_schema()
        }
    })
}

/// Concatenated text parts of the first candidate.
pub fn extract_text(response: &Value) -> Result<String, CallError> {
    if let Some(reason) = response
        .pointer("/promptFeedback/blockReason")
        .and_then(|r| r.as_str())
    {
        return Err(CallError::Provider(format!("request blocked: {reason}")));
    }

    let parts = response
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| CallError::Malformed("no candidate content".into()))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();
    if text.trim().is_empty() {
        return Err(CallError::Malformed("no response text".into()));
    }
    Ok(text)
}

/// Parse the model's JSON answer into a normalized record.
pub fn parse_business_record(text: &str) -> Result<BusinessRecord, AnalysisError> {
    let body = strip_code_fence(text);
    let record: BusinessRecord = serde_json::from_str(body)
        .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;
    if record.business_name.trim().is_empty() {
        return Err(AnalysisError::MalformedResponse(
            "empty businessName".into(),
        ));
    }
    Ok(record.normalized())
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use signlens_types::ImageEncoding;

    #[test]
    fn test_request_body_shape() {
        let image = CapturedImage::new(vec![1, 2, 3], ImageEncoding::Jpeg, 1, 1);
        let body = analysis_request_body(&image, "Chennai, Tamil Nadu");
        assert_eq!(
            body.pointer("/contents/0/parts/0/inlineData/mimeType"),
            Some(&json!("image/jpeg"))
        );
        assert_eq!(
            body.pointer("/contents/0/parts/0/inlineData/data"),
            Some(&json!("AQID"))
        );
        let prompt = body
            .pointer("/contents/0/parts/1/text")
            .and_then(|t| t.as_str())
            .unwrap();
        assert!(prompt.contains("Chennai, Tamil Nadu"));
        let required = body
            .pointer("/generationConfig/responseSchema/required")
            .unwrap();
        assert_eq!(
            required,
            &json!(["businessName", "detectedLanguage", "category", "summary"])
        );
    }

    #[test]
    fn test_prompt_unknown_location() {
        assert!(analysis_prompt("  ").contains("location: Unknown."));
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let resp = json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] } }]
        });
        assert_eq!(extract_text(&resp).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn test_extract_text_errors() {
        assert!(matches!(
            extract_text(&json!({ "candidates": [] })),
            Err(CallError::Malformed(_))
        ));
        assert!(matches!(
            extract_text(&json!({ "promptFeedback": { "blockReason": "SAFETY" } })),
            Err(CallError::Provider(_))
        ));
        let empty = json!({ "candidates": [{ "content": { "parts": [{ "text": " " }] } }] });
        assert!(matches!(extract_text(&empty), Err(CallError::Malformed(_))));
    }

    #[test]
    fn test_parse_record() {
        let text = r#"{
            "businessName": "श्री गणेश भोजनालय",
            "transliteration": "Shri Ganesh Bhojanalaya",
            "detectedLanguage": "Hindi",
            "category": "Restaurant",
            "confidence": 92,
            "products": [{ "name": "Thali", "price": "₹120" }],
            "addressContext": "Indore",
            "summary": "Unlimited thalis that locals swear by."
        }"#;
        let record = parse_business_record(text).unwrap();
        assert_eq!(
            record.transliteration.as_deref(),
            Some("Shri Ganesh Bhojanalaya")
        );
        assert_eq!(record.confidence, 92.0);
        assert_eq!(record.products.len(), 1);
    }

    #[test]
    fn test_parse_record_in_code_fence() {
        let text = "```json\n{\"businessName\":\"A\",\"detectedLanguage\":\"Tamil\",\"category\":\"Pharmacy\",\"summary\":\"S\"}\n```";
        let record = parse_business_record(text).unwrap();
        assert_eq!(record.category, "Pharmacy");
    }

    #[test]
    fn test_parse_record_malformed() {
        assert!(matches!(
            parse_business_record("not json"),
            Err(AnalysisError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_business_record(r#"{"businessName":"A","category":"B","summary":"C"}"#),
            Err(AnalysisError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_business_record(
                r#"{"businessName":" ","detectedLanguage":"x","category":"B","summary":"C"}"#
            ),
            Err(AnalysisError::MalformedResponse(_))
        ));
    }
}
