use pretty_assertions::assert_eq;
use serde_json::json;

use sheet_ocr_worker::extraction::{
    ExtractionError, ExtractionResult, ResponseShape, Table, column_headers, interpret,
    strip_code_fence,
};
use sheet_ocr_worker::gemini::{
    ENVELOPE_FIELD, GenerateContentResponse, Part, build_request, endpoint, media_type,
    mime_type_for_path, unwrap_envelope, upstream_error,
};
use sheet_ocr_worker::image::ImageReference;
use sheet_ocr_worker::prompt::{OCR_PROMPT, PromptTemplate};

const PNG_URI: &str = "data:image/png;base64,iVBORw0KGgo=";

fn rows(value: serde_json::Value) -> Vec<sheet_ocr_worker::extraction::TableRow> {
    serde_json::from_value(value).expect("rows fixture")
}

#[test]
fn json_array_of_objects_is_tabular() {
    let interpretation = interpret(r#"[{"Name":"A","Qty":"3"},{"Name":"B","Qty":4}]"#);

    assert_eq!(interpretation.shape, ResponseShape::Table);
    let table = interpretation.result.as_table().expect("table result");
    assert_eq!(table.headers, vec!["Name", "Qty"]);
    assert_eq!(table.len(), 2);
}

#[test]
fn plain_text_falls_back_to_text_without_failing() {
    let interpretation = interpret("not json");

    assert_eq!(interpretation.shape, ResponseShape::Unexpected);
    assert_eq!(
        interpretation.result,
        ExtractionResult::Text {
            value: "not json".to_string()
        }
    );
}

#[test]
fn text_object_is_expected_text() {
    let interpretation = interpret(r#"{"text":"Invoice 42\nTotal: 10"}"#);

    assert_eq!(interpretation.shape, ResponseShape::TextObject);
    assert!(interpretation.shape.is_expected());
    assert_eq!(
        interpretation.result,
        ExtractionResult::Text {
            value: "Invoice 42\nTotal: 10".to_string()
        }
    );
}

#[test]
fn single_key_object_wrapping_rows_is_tabular() {
    let interpretation = interpret(r#"{"rows":[{"a":1},{"a":2}]}"#);

    assert_eq!(interpretation.shape, ResponseShape::WrappedTable);
    assert_eq!(interpretation.result.as_table().map(Table::len), Some(2));
}

#[test]
fn text_key_wrapping_rows_is_tabular() {
    let interpretation = interpret(r#"{"text":[{"a":"1"},{"b":"2"}]}"#);

    assert_eq!(interpretation.shape, ResponseShape::WrappedTable);
    let table = interpretation.result.as_table().expect("table result");
    assert_eq!(table.headers, vec!["a", "b"]);
    assert_eq!(table.len(), 2);
}

#[test]
fn text_key_beside_other_keys_still_reads_as_text() {
    let interpretation = interpret(r#"{"text":"hello","confidence":0.9}"#);

    assert_eq!(interpretation.shape, ResponseShape::TextObject);
    assert_eq!(
        interpretation.result,
        ExtractionResult::Text {
            value: "hello".to_string()
        }
    );
}

#[test]
fn unexpected_json_shapes_are_kept_verbatim() {
    for raw in ["[1,2,3]", r#"[{"a":1},null]"#, "42", r#"{"a":1,"b":2}"#, r#"{"rows":[]}"#] {
        let interpretation = interpret(raw);
        assert_eq!(interpretation.shape, ResponseShape::Unexpected, "input: {raw}");
        assert_eq!(
            interpretation.result,
            ExtractionResult::Text {
                value: raw.to_string()
            },
            "input: {raw}"
        );
    }
}

#[test]
fn empty_array_is_an_empty_table() {
    let interpretation = interpret("[]");

    assert_eq!(interpretation.shape, ResponseShape::Table);
    let table = interpretation.result.as_table().expect("table result");
    assert!(table.is_empty());
    assert!(table.headers.is_empty());
}

#[test]
fn fenced_json_is_unwrapped_before_parsing() {
    let raw = "```json\n[{\"a\":\"x\"}]\n```";
    assert_eq!(strip_code_fence(raw), "[{\"a\":\"x\"}]");
    assert_eq!(interpret(raw).shape, ResponseShape::Table);

    assert_eq!(strip_code_fence("  plain  "), "plain");
}

#[test]
fn headers_are_the_union_in_first_seen_order() {
    let rows = rows(json!([{"a": 1}, {"b": 2, "a": 3}, {"c": null}]));

    assert_eq!(column_headers(&rows), vec!["a", "b", "c"]);
    assert_eq!(column_headers(&rows), column_headers(&rows));
}

#[test]
fn headers_keep_the_model_key_order() {
    let interpretation = interpret(r#"[{"b":1,"a":2}]"#);
    assert_eq!(
        interpretation.result.as_table().map(|table| table.headers.clone()),
        Some(vec!["b".to_string(), "a".to_string()])
    );

    let rows = rows(json!([{"a": 1, "b": 2}]));
    assert_eq!(column_headers(&rows), vec!["a", "b"]);
}

#[test]
fn result_serializes_as_a_discriminated_shape() {
    let text = serde_json::to_value(ExtractionResult::Text {
        value: "x".to_string(),
    })
    .expect("serialize text");
    assert_eq!(text, json!({"kind": "text", "value": "x"}));

    let table = interpret(r#"[{"Name":"A"}]"#).result;
    assert_eq!(table.kind(), "table");
    assert_eq!(
        serde_json::to_value(&table).expect("serialize table"),
        json!({"kind": "table", "headers": ["Name"], "rows": [{"Name": "A"}]})
    );
}

#[test]
fn data_uri_references_are_inline() {
    let image = ImageReference::parse(PNG_URI).expect("valid data URI");

    assert_eq!(
        image,
        ImageReference::Inline {
            mime_type: "image/png".to_string(),
            data: "iVBORw0KGgo=".to_string(),
        }
    );
    assert!(matches!(image, ImageReference::Inline { .. }));
    assert_eq!(image.to_string(), PNG_URI);

    let with_params: ImageReference = "DATA:Image/JPEG;name=scan.jpg;base64,/9j/"
        .parse()
        .expect("data URI with params");
    assert_eq!(
        with_params,
        ImageReference::Inline {
            mime_type: "image/jpeg".to_string(),
            data: "/9j/".to_string(),
        }
    );
}

#[test]
fn blank_references_are_missing_images() {
    assert_eq!(ImageReference::parse(""), Err(ExtractionError::MissingImage));
    assert_eq!(ImageReference::parse("   "), Err(ExtractionError::MissingImage));
    assert_eq!(
        ImageReference::parse("data:image/png;base64,"),
        Err(ExtractionError::MissingImage)
    );
}

#[test]
fn malformed_references_are_rejected() {
    for input in [
        "data:image/png,rawbytes",
        "data:;base64,abc",
        "data:image/png;base64",
        "ftp://example.com/scan.png",
        "not a uri",
    ] {
        let error = ImageReference::parse(input).expect_err("reference should be rejected");
        assert!(
            matches!(error, ExtractionError::InvalidReference(_)),
            "input: {input}, error: {error:?}"
        );
        assert!(error.is_input_error());
    }
}

#[test]
fn http_urls_are_remote_references() {
    let image = ImageReference::parse("https://example.com/receipts/scan.PNG").expect("valid URL");

    assert!(matches!(image, ImageReference::Remote(_)));
    assert_eq!(image.to_string(), "https://example.com/receipts/scan.PNG");
}

#[test]
fn uploaded_bytes_become_a_base64_data_uri() {
    let image = ImageReference::from_bytes(b"hi", "Image/PNG");

    assert_eq!(image.to_string(), "data:image/png;base64,aGk=");
}

#[test]
fn ocr_prompt_places_the_image_between_instructions() {
    let image = ImageReference::parse(PNG_URI).expect("valid data URI");
    let parts = PromptTemplate::ocr().render(&image);

    assert_eq!(parts.len(), 3);
    assert!(matches!(&parts[0], Part::Text(text) if text.starts_with("You are an expert OCR")));
    assert_eq!(parts[1], Part::image(&image));
    assert!(matches!(&parts[2], Part::Text(text) if text.contains("JSON array of objects")));
    assert!(OCR_PROMPT.contains("\"text\""));
}

#[test]
fn templates_without_a_marker_get_the_image_appended() {
    let image = ImageReference::parse(PNG_URI).expect("valid data URI");

    assert_eq!(
        PromptTemplate::new("Read this").render(&image),
        vec![Part::text("Read this"), Part::image(&image)]
    );
    assert_eq!(
        PromptTemplate::new("{{media}}").render(&image),
        vec![Part::image(&image)]
    );
}

#[test]
fn generate_content_request_matches_the_gemini_wire_format() {
    let image = ImageReference::parse(PNG_URI).expect("valid data URI");
    let request = build_request(&PromptTemplate::ocr(), &image, None);
    let body = serde_json::to_value(&request).expect("serialize request");

    assert_eq!(body["contents"][0]["role"], "user");
    assert_eq!(
        body["contents"][0]["parts"][1],
        json!({"inlineData": {"mimeType": "image/png", "data": "iVBORw0KGgo="}})
    );
    assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
    assert_eq!(
        body["generationConfig"]["responseSchema"]["required"][0],
        ENVELOPE_FIELD
    );
    assert!(body["generationConfig"].get("temperature").is_none());

    let tuned = build_request(&PromptTemplate::ocr(), &image, Some(0.5));
    let tuned_body = serde_json::to_value(&tuned).expect("serialize request");
    assert_eq!(tuned_body["generationConfig"]["temperature"], json!(0.5));
}

#[test]
fn remote_images_render_as_file_data() {
    let image = ImageReference::parse("https://example.com/scan.jpg").expect("valid URL");

    assert_eq!(
        serde_json::to_value(Part::image(&image)).expect("serialize part"),
        json!({"fileData": {"mimeType": "image/jpeg", "fileUri": "https://example.com/scan.jpg"}})
    );
}

#[test]
fn response_text_comes_from_the_first_candidate() {
    let body = json!({
        "candidates": [{
            "content": {"parts": [
                {"text": "thinking...", "thought": true},
                {"text": "{\"extractedData\":"},
                {"text": "\"[]\"}"}
            ]},
            "finishReason": "STOP"
        }]
    });
    let response: GenerateContentResponse = serde_json::from_value(body).expect("response");

    assert_eq!(
        response.into_text(),
        Ok("{\"extractedData\":\"[]\"}".to_string())
    );
}

#[test]
fn blocked_or_empty_responses_are_errors() {
    let blocked: GenerateContentResponse =
        serde_json::from_value(json!({"promptFeedback": {"blockReason": "SAFETY"}}))
            .expect("response");
    assert_eq!(
        blocked.into_text(),
        Err(ExtractionError::Rejected("SAFETY".to_string()))
    );

    let empty: GenerateContentResponse =
        serde_json::from_value(json!({})).expect("response");
    assert_eq!(empty.into_text(), Err(ExtractionError::EmptyResponse));

    let truncated: GenerateContentResponse = serde_json::from_value(json!({
        "candidates": [{"content": {"parts": []}, "finishReason": "MAX_TOKENS"}]
    }))
    .expect("response");
    assert_eq!(
        truncated.into_text(),
        Err(ExtractionError::Rejected("MAX_TOKENS".to_string()))
    );
}

#[test]
fn upstream_errors_pass_the_message_through() {
    let body = r#"{"error":{"code":400,"message":"API key not valid.","status":"INVALID_ARGUMENT"}}"#;
    assert_eq!(
        upstream_error(400, body),
        ExtractionError::Remote("API key not valid.".to_string())
    );
    assert_eq!(
        upstream_error(503, "<html>unavailable</html>").to_string(),
        "model request failed: status 503"
    );
}

#[test]
fn envelope_payload_is_unwrapped() {
    assert_eq!(
        unwrap_envelope(r#"{"extractedData":"[{\"a\":1}]"}"#),
        r#"[{"a":1}]"#
    );
    assert_eq!(unwrap_envelope(r#"{"extractedText":"hello"}"#), "hello");
    assert_eq!(
        unwrap_envelope(r#"{"extractedData":[{"a":1}]}"#),
        r#"[{"a":1}]"#
    );
    assert_eq!(
        unwrap_envelope("```json\n{\"extractedData\":\"{\\\"text\\\":\\\"hi\\\"}\"}\n```"),
        r#"{"text":"hi"}"#
    );
    assert_eq!(unwrap_envelope("  plain text  "), "plain text");
    assert_eq!(unwrap_envelope(r#"{"text":"hi"}"#), r#"{"text":"hi"}"#);
}

#[test]
fn endpoint_is_built_from_base_and_model() {
    let url = endpoint(
        "https://generativelanguage.googleapis.com/",
        "models/gemini-2.0-flash",
    )
    .expect("valid endpoint");

    assert_eq!(
        url.as_str(),
        "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
    );
    assert!(endpoint("not a base", "gemini-2.0-flash").is_err());
}

#[test]
fn image_mime_types_are_guessed_from_paths_and_headers() {
    assert_eq!(mime_type_for_path("/scans/page.JPG"), Some("image/jpeg"));
    assert_eq!(mime_type_for_path("/scans/page.webp"), Some("image/webp"));
    assert_eq!(mime_type_for_path("/scans/page"), None);
    assert_eq!(media_type("image/png; charset=binary"), "image/png");
}
