use crate::{
    ErrorCode, ErrorObject, ErrorPayload, MessageBatch, Request, RequestId, Response,
    SessionError,
    message::RawMessage,
};
use serde_json::{Value, json};

#[test]
fn raw_message_deserialize_request() -> anyhow::Result<()> {
    let input = r#"{"jsonrpc":"2.0","id":1,"method":"test_method","params":{"param1":"value1"}}"#;
    let m = serde_json::from_str::<RawMessage>(input)?;
    let r = m.try_into_request().unwrap();
    assert_eq!(r.id, Some(RequestId::Number(1)));
    assert_eq!(r.method, "test_method");
    assert_eq!(r.params, json!({"param1": "value1"}));
    Ok(())
}

#[test]
fn raw_message_deserialize_request_no_params() -> anyhow::Result<()> {
    let input = r#"{"jsonrpc":"2.0","id":"a","method":"test_method"}"#;
    let m = serde_json::from_str::<RawMessage>(input)?;
    let r = m.try_into_request().unwrap();
    assert_eq!(r.id, Some(RequestId::String("a".into())));
    assert_eq!(r.params, Value::Null);
    Ok(())
}

#[test]
fn raw_message_deserialize_notification() -> anyhow::Result<()> {
    let input = r#"{"jsonrpc":"2.0","id":null,"method":"test_method","params":[1,2]}"#;
    let r = serde_json::from_str::<RawMessage>(input)?
        .try_into_request()
        .unwrap();
    assert!(r.is_notification());
    assert_eq!(r.params, json!([1, 2]));
    Ok(())
}

#[test]
fn raw_message_deserialize_escaped() -> anyhow::Result<()> {
    let input = r#"{"jsonrpc":"2.0","id":1,"method":"あ","params":{"param1":"value1"}}"#;
    let r = serde_json::from_str::<RawMessage>(input)?
        .try_into_request()
        .unwrap();
    assert_eq!(r.method, "あ");
    Ok(())
}

#[test]
fn raw_message_rejects_non_string_method() {
    let input = r#"{"jsonrpc":"2.0","id":1,"method":42,"params":[]}"#;
    assert!(serde_json::from_str::<RawMessage>(input).is_err());
}

#[test]
fn raw_message_rejects_scalar_params_and_wrong_version() -> anyhow::Result<()> {
    let scalar = r#"{"jsonrpc":"2.0","id":1,"method":"m","params":3}"#;
    assert!(serde_json::from_str::<RawMessage>(scalar)?
        .try_into_request()
        .is_none());
    let version = r#"{"jsonrpc":"1.0","id":1,"method":"m","params":[]}"#;
    assert!(serde_json::from_str::<RawMessage>(version)?
        .try_into_request()
        .is_none());
    Ok(())
}

#[test]
fn request_id_display_and_equality() {
    assert_eq!(RequestId::Number(7).to_string(), "7");
    assert_eq!(RequestId::String("7".into()).to_string(), "7");
    assert_eq!(RequestId::Float(1.5), RequestId::Float(1.5));
    assert_ne!(RequestId::Number(7), RequestId::String("7".into()));
    assert_eq!(
        RequestId::Number(7).to_response_id(),
        RequestId::String("7".into())
    );
}

#[test]
fn request_roundtrip() -> anyhow::Result<()> {
    let requests = [
        Request::new(1u64, "echo", json!({"x": 1})),
        Request::new("abc", "ünïcode/method", json!([null, true, 1.5, "s"])),
        Request::new(u64::MAX, "no_params", Value::Null),
        Request::notification("note", json!([])),
    ];
    for r in requests {
        let s = serde_json::to_string(&r)?;
        assert_eq!(serde_json::from_str::<Request>(&s)?, r, "{s}");
    }
    Ok(())
}

#[test]
fn success_serializes_with_string_id() -> anyhow::Result<()> {
    let r = Response::success(Some(&RequestId::Number(1)), json!({"x": 1}));
    assert_eq!(
        serde_json::to_value(&r)?,
        json!({"jsonrpc": "2.0", "id": "1", "result": {"x": 1}})
    );
    Ok(())
}

#[test]
fn error_serializes_standard_and_custom() -> anyhow::Result<()> {
    let r = Response::error(None, ErrorCode::PARSE_ERROR);
    assert_eq!(
        serde_json::to_value(&r)?,
        json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "Parse error"}})
    );
    let r = Response::error(
        Some(&RequestId::String("q".into())),
        ErrorPayload::Custom(json!(["anything", 1])),
    );
    assert_eq!(
        serde_json::to_value(&r)?,
        json!({"jsonrpc": "2.0", "id": "q", "error": ["anything", 1]})
    );
    Ok(())
}

#[test]
fn classify_success_with_null_result() -> anyhow::Result<()> {
    let r = Response::classify(json!({"jsonrpc": "2.0", "id": "3", "result": null}))?;
    let Response::Success(s) = r else {
        panic!("expected success");
    };
    assert_eq!(s.result, Value::Null);
    assert_eq!(s.id, Some(RequestId::String("3".into())));
    Ok(())
}

#[test]
fn classify_error_object_and_custom() -> anyhow::Result<()> {
    let r = Response::classify(
        json!({"jsonrpc": "2.0", "id": "1", "error": {"code": -32601, "message": "Method not found"}}),
    )?;
    let Response::Error(e) = r else {
        panic!("expected error");
    };
    assert_eq!(
        e.error,
        ErrorPayload::Object(ErrorObject::from(ErrorCode::METHOD_NOT_FOUND))
    );

    let r = Response::classify(json!({"jsonrpc": "2.0", "id": "1", "error": "boom"}))?;
    let Response::Error(e) = r else {
        panic!("expected error");
    };
    assert_eq!(e.error, ErrorPayload::Custom(json!("boom")));
    assert_eq!(e.error.code(), None);
    Ok(())
}

#[test]
fn classify_rejects_both_or_neither() {
    let both = json!({"jsonrpc": "2.0", "id": "1", "result": 1, "error": {"code": 1, "message": "m"}});
    assert!(matches!(
        Response::classify(both),
        Err(SessionError::MalformedResponse(_))
    ));
    let neither = json!({"jsonrpc": "2.0", "id": "1"});
    assert!(matches!(
        Response::classify(neither),
        Err(SessionError::MalformedResponse(_))
    ));
    assert!(matches!(
        Response::classify(json!(5)),
        Err(SessionError::MalformedResponse(_))
    ));
}

#[test]
fn response_batch_deserialize() -> anyhow::Result<()> {
    let input = r#"[{"jsonrpc":"2.0","id":"1","result":1},{"jsonrpc":"2.0","id":"2","error":{"code":-1,"message":"x"}}]"#;
    let batch = serde_json::from_str::<MessageBatch<Response>>(input)?;
    assert_eq!(batch.len(), 2);
    let ids: Vec<_> = batch
        .into_iter()
        .map(|r| r.id().map(|id| id.to_string()))
        .collect();
    assert_eq!(ids, [Some("1".to_string()), Some("2".to_string())]);
    Ok(())
}

#[test]
fn error_response_reencodes_unchanged() -> anyhow::Result<()> {
    let inputs = [
        json!({"jsonrpc": "2.0", "id": "4", "error": {"code": -5, "message": "m", "detail": {"k": 7}}}),
        json!({"jsonrpc": "2.0", "id": "5", "error": {"code": -5, "message": "m", "data": null}}),
        json!({"jsonrpc": "2.0", "id": "6", "error": {"code": -5, "message": "m", "data": [1]}}),
        json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32700, "message": "Parse error"}}),
    ];
    for input in inputs {
        let r = Response::classify(input.clone())?;
        assert_eq!(serde_json::to_value(&r)?, input);
    }

    let extra = json!({"jsonrpc": "2.0", "id": "7", "error": {"code": -5, "message": "m", "detail": 1}});
    let Response::Error(e) = Response::classify(extra)? else {
        panic!("expected error");
    };
    assert_eq!(e.error.code(), None);
    Ok(())
}
