use anyhow::Result;
use poml::formats::langchain::messages_to_langchain;
use poml::formats::openai::messages_to_openai_spec;
use poml::models::content::ContentPart;
use poml::{convert, convert_frame, Frame, Message, OutputFormat, PomlError, Rendered, Speaker};
use serde_json::{json, Value};
use strum::IntoEnumIterator;

fn structured_formats() -> impl Iterator<Item = OutputFormat> {
    OutputFormat::iter().filter(|format| *format != OutputFormat::Raw)
}

fn json_of(rendered: Rendered) -> Value {
    match rendered {
        Rendered::Json(value) => value,
        other => panic!("Expected JSON output, got {:?}", other),
    }
}

fn tool_conversation() -> Value {
    json!({
        "messages": [
            {"speaker": "human", "content": "Search for Python"},
            {"speaker": "ai", "content": [{
                "type": "application/vnd.poml.toolrequest",
                "id": "call_123",
                "name": "search",
                "content": {"query": "Python"}
            }]},
            {"speaker": "tool", "content": [{
                "type": "application/vnd.poml.toolresponse",
                "id": "call_123",
                "name": "search",
                "content": "Python is a language."
            }]}
        ]
    })
}

#[test]
fn message_list_of_single_human_message() -> Result<()> {
    let output = r#"{"messages": [{"speaker": "human", "content": "Hello world"}]}"#;
    let rendered = json_of(convert(output, true, OutputFormat::MessageDict)?);
    assert_eq!(
        serde_json::to_string(&rendered)?,
        r#"[{"speaker":"human","content":"Hello world"}]"#
    );
    Ok(())
}

#[test]
fn openai_chat_tool_round() -> Result<()> {
    let output = tool_conversation().to_string();
    let rendered = json_of(convert(&output, true, OutputFormat::OpenaiChat)?);
    assert_eq!(
        serde_json::to_string(&rendered["messages"])?,
        concat!(
            r#"[{"role":"user","content":"Search for Python"},"#,
            r#"{"role":"assistant","tool_calls":[{"id":"call_123","type":"function","function":{"name":"search","arguments":"{\"query\": \"Python\"}"}}]},"#,
            r#"{"role":"tool","content":"Python is a language.","tool_call_id":"call_123"}]"#
        )
    );
    Ok(())
}

#[test]
fn openai_chat_runtime_keys_are_snake_cased() -> Result<()> {
    let output = json!({
        "messages": [{"speaker": "human", "content": "Test"}],
        "runtime": {"maxTokens": 1000, "topP": 0.95}
    });
    let rendered = json_of(convert(&output.to_string(), true, OutputFormat::OpenaiChat)?);
    assert_eq!(
        rendered,
        json!({
            "messages": [{"role": "user", "content": "Test"}],
            "max_tokens": 1000,
            "top_p": 0.95
        })
    );
    Ok(())
}

#[test]
fn image_content_in_both_chat_formats() -> Result<()> {
    let output = json!([{
        "speaker": "human",
        "content": ["Image ", {"type": "image/png", "base64": "abc", "alt": "tiny"}]
    }])
    .to_string();

    let openai = json_of(convert(&output, true, OutputFormat::OpenaiChat)?);
    assert_eq!(
        openai["messages"][0]["content"],
        json!([
            {"type": "text", "text": "Image "},
            {"type": "image_url", "image_url": {"url": "data:image/png;base64,abc"}}
        ])
    );

    let langchain = json_of(convert(&output, true, OutputFormat::Langchain)?);
    assert_eq!(
        langchain["messages"][0]["data"]["content"],
        json!([
            {"type": "text", "text": "Image "},
            {"type": "image", "source_type": "base64", "data": "abc", "mime_type": "image/png"}
        ])
    );
    Ok(())
}

#[test]
fn misplaced_tool_request_fails_for_every_format() {
    let output = json!([{
        "speaker": "human",
        "content": [{
            "type": "application/vnd.poml.toolrequest",
            "id": "call_1",
            "name": "search",
            "content": {}
        }]
    }])
    .to_string();

    for format in structured_formats() {
        assert!(
            matches!(
                convert(&output, true, format),
                Err(PomlError::MisplacedToolCall(_))
            ),
            "format {}",
            format
        );
    }

    let built = Message::new(
        Speaker::Human,
        vec![ContentPart::tool_request("call_1", "search", json!({}))],
    );
    assert!(matches!(built, Err(PomlError::MisplacedToolCall(_))));
}

#[test]
fn unknown_speaker_fails_for_every_format() {
    let output = r#"[{"speaker": "narrator", "content": "Once"}]"#;
    for format in structured_formats() {
        assert!(matches!(
            convert(output, true, format),
            Err(PomlError::UnknownSpeaker(name)) if name == "narrator"
        ));
    }
}

#[test]
fn unrecognized_part_is_rejected() {
    let output = r#"[{"speaker": "human", "content": [{"kind": "video"}]}]"#;
    assert!(matches!(
        convert(output, true, OutputFormat::Dict),
        Err(PomlError::UnrecognizedContentPart(_))
    ));
}

#[test]
fn dict_round_trip_preserves_frame() -> Result<()> {
    let output = json!({
        "messages": [
            {"speaker": "system", "content": "Be brief."},
            {"speaker": "human", "content": ["Look ", {"type": "image/jpeg", "base64": "xyz"}]},
            {"speaker": "ai", "content": [
                "Let me check.",
                {"type": "application/vnd.poml.toolrequest", "id": "c1", "name": "lookup", "content": {"q": "x"}}
            ]},
            {"speaker": "tool", "content": [{
                "type": "application/vnd.poml.toolresponse",
                "id": "c1",
                "name": "lookup",
                "content": ["found", {"type": "image/png", "base64": "abc", "alt": "chart"}]
            }]}
        ],
        "schema": {"type": "object", "properties": {"answer": {"type": "string"}}},
        "tools": [{"type": "function", "name": "lookup", "description": "Look up", "parameters": {"type": "object"}}],
        "runtime": {"temperature": 0.2, "maxTokens": 64}
    });

    let frame = Frame::from_value(&output)?;
    let dict = json_of(convert_frame(frame.clone(), OutputFormat::Dict)?);
    assert_eq!(dict, output);
    assert_eq!(Frame::from_value(&dict)?, frame);
    Ok(())
}

#[test]
fn text_only_formats_agree() -> Result<()> {
    let texts = ["You are terse.", "What is 2 + 2?", "4"];
    let output = json!({
        "messages": [
            {"speaker": "system", "content": texts[0]},
            {"speaker": "human", "content": texts[1]},
            {"speaker": "ai", "content": texts[2]}
        ]
    })
    .to_string();

    let message_list = json_of(convert(&output, true, OutputFormat::MessageDict)?);
    let dict = json_of(convert(&output, true, OutputFormat::Dict)?);
    let openai = json_of(convert(&output, true, OutputFormat::OpenaiChat)?);
    let langchain = json_of(convert(&output, true, OutputFormat::Langchain)?);

    let collect = |messages: &Value, pointer: &str| -> Vec<String> {
        messages
            .as_array()
            .unwrap()
            .iter()
            .map(|m| m.pointer(pointer).and_then(Value::as_str).unwrap().to_string())
            .collect()
    };
    assert_eq!(collect(&message_list, "/content"), texts);
    assert_eq!(collect(&dict["messages"], "/content"), texts);
    assert_eq!(collect(&openai["messages"], "/content"), texts);
    assert_eq!(collect(&langchain["messages"], "/data/content"), texts);
    assert_eq!(
        collect(&openai["messages"], "/role"),
        ["system", "user", "assistant"]
    );
    assert_eq!(
        collect(&langchain["messages"], "/type"),
        ["system", "human", "ai"]
    );
    Ok(())
}

#[test]
fn conversions_are_byte_identical_across_runs() -> Result<()> {
    let mut output = tool_conversation();
    output["runtime"] = json!({"temperature": 0.5, "responseFormat": "text"});
    output["tools"] = json!([{"name": "search", "description": "Search", "parameters": {"type": "object"}}]);
    let output = output.to_string();

    for format in OutputFormat::iter() {
        let first = convert(&output, true, format)?.to_text()?;
        let second = convert(&output, true, format)?.to_text()?;
        assert_eq!(first, second, "format {}", format);
    }
    Ok(())
}

#[test]
fn builder_messages_match_decoded_messages() -> Result<()> {
    let built = vec![
        Message::human().with_plain("Search for Python"),
        Message::ai().with_tool_request("call_123", "search", json!({"query": "Python"})),
        Message::tool().with_tool_response(
            "call_123",
            "search",
            poml::models::content::ToolResponseContent::Text("Python is a language.".to_string()),
        ),
    ];
    let decoded = Frame::from_value(&tool_conversation())?.messages;
    assert_eq!(built, decoded);
    assert_eq!(
        messages_to_openai_spec(&built)?,
        messages_to_openai_spec(&decoded)?
    );
    assert_eq!(messages_to_langchain(&built)?, messages_to_langchain(&decoded)?);
    Ok(())
}

#[test]
fn non_chat_output_becomes_one_human_message() -> Result<()> {
    let rendered = json_of(convert(
        r#"["Describe this ", {"type": "image/png", "base64": "abc"}]"#,
        false,
        OutputFormat::Langchain,
    )?);
    assert_eq!(rendered["messages"].as_array().map(Vec::len), Some(1));
    assert_eq!(rendered["messages"][0]["type"], "human");
    Ok(())
}

#[test]
fn serde_decoding_rejects_misplaced_tool_request() {
    let output = json!({"messages": [{
        "speaker": "human",
        "content": [{
            "type": "application/vnd.poml.toolrequest",
            "id": "call_1",
            "name": "search",
            "content": {}
        }]
    }]});
    let err = serde_json::from_value::<Frame>(output.clone()).unwrap_err();
    assert!(err.to_string().contains("Misplaced tool call"), "{}", err);
    assert!(matches!(
        Frame::from_value(&output),
        Err(PomlError::MisplacedToolCall(_))
    ));
}

#[test]
fn langchain_passes_tools_through_unchanged() -> Result<()> {
    let output = r#"{"messages": [], "tools": [{"type": "function", "name": "ping"}]}"#;
    let rendered = json_of(convert(output, true, OutputFormat::Langchain)?);
    assert_eq!(
        serde_json::to_string(&rendered)?,
        r#"{"messages":[],"tools":[{"type":"function","name":"ping"}]}"#
    );

    let dict = json_of(convert(output, true, OutputFormat::Dict)?);
    assert_eq!(
        serde_json::to_string(&dict["tools"])?,
        r#"[{"type":"function","name":"ping"}]"#
    );
    Ok(())
}

#[test]
fn openai_chat_accepts_tool_without_name() -> Result<()> {
    let output = json!({
        "messages": [{"speaker": "human", "content": "Hi"}],
        "tools": [{"description": "Unnamed helper"}]
    })
    .to_string();
    let rendered = json_of(convert(&output, true, OutputFormat::OpenaiChat)?);
    assert_eq!(
        rendered["tools"],
        json!([{
            "type": "function",
            "function": {"name": "", "description": "Unnamed helper", "parameters": {}}
        }])
    );
    Ok(())
}

#[test]
fn non_chat_dict_formats_keep_rendered_value() -> Result<()> {
    let output = r#"["Describe this ", {"type": "image/png", "base64": "abc"}]"#;
    let message_dict = json_of(convert(output, false, OutputFormat::MessageDict)?);
    assert_eq!(message_dict, json!(["Describe this ", {"type": "image/png", "base64": "abc"}]));

    let dict = json_of(convert(output, false, OutputFormat::Dict)?);
    assert_eq!(dict, json!({"messages": message_dict}));
    Ok(())
}
