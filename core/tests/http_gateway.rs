/// HTTP client and SSE transport against an in-process gateway stub
use bytes::Bytes;
use chat_sync_core::api::{ChatApi, HttpChatApi};
use chat_sync_core::transport::{PushFrame, PushTransport, SseTransport};
use chat_sync_core::{ChatError, ChatSync, Config, ConversationId, Direction, MessageContent, OutgoingFile};
use futures_util::StreamExt;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
struct Recorded {
    method: String,
    path: String,
    csrf: Option<String>,
    content_type: Option<String>,
    body: Bytes,
}

type Log = Arc<Mutex<Vec<Recorded>>>;

const SSE_BODY: &str = concat!(
    ": connected\n\n",
    "data: {\"type\":\"connected\"}\n\n",
    "event: message\r\n",
    "data: {\"type\":\"new_message\",\"data\":{\"id\":\"p1\",\"from\":\"5599@c.us\",\"body\":\"chegou\",\"timestamp\":1700000100}}\r\n\r\n",
);

fn json_resp(status: StatusCode, value: Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .body(Full::new(Bytes::from(value.to_string())))
        .unwrap()
}

async fn handle(req: Request<Incoming>, log: Log, sse_up: bool) -> Response<Full<Bytes>> {
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    let header = |name: &str| {
        req.headers()
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    let csrf = header("x-csrftoken");
    let content_type = header("content-type");
    let body = req
        .into_body()
        .collect()
        .await
        .map(|b| b.to_bytes())
        .unwrap_or_default();
    log.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: path.clone(),
        csrf: csrf.clone(),
        content_type,
        body: body.clone(),
    });

    match (method.as_str(), path.as_str()) {
        ("GET", "/api/chat/list/") => json_resp(
            StatusCode::OK,
            json!({ "chats": [{
                "id": { "_serialized": "5511@c.us" },
                "name": "Ana",
                "unreadCount": 2,
                "timestamp": 1700000000,
                "lastMessage": { "id": "m2", "body": "tudo bem?", "fromMe": false, "timestamp": 1700000000 }
            }, {
                "name": "row without id"
            }]}),
        ),
        ("GET", "/api/chat/messages/5511%40c.us/") => json_resp(
            StatusCode::OK,
            json!([
                { "id": "m1", "body": "oi", "fromMe": true, "ack": 3, "timestamp": 1699999990 },
                { "id": "m2", "body": "tudo bem?", "fromMe": false, "timestamp": 1700000000 },
                { "id": "m3", "type": "image", "caption": "print", "fromMe": false, "timestamp": 1700000005 }
            ]),
        ),
        ("GET", "/api/chat/profile-pic/5511%40c.us/") => {
            json_resp(StatusCode::OK, json!({ "eurl": "https://pps.example/ana.jpg" }))
        }
        ("GET", "/api/chat/download/m3/") => Response::new(Full::new(Bytes::from_static(b"\x89PNG"))),
        ("POST", _) if csrf.as_deref() != Some("tok") => {
            json_resp(StatusCode::FORBIDDEN, json!({ "error": "CSRF verification failed" }))
        }
        ("POST", "/api/chat/mark-as-read/") => Response::new(Full::new(Bytes::from_static(b"OK"))),
        ("POST", "/api/chat/send-message/") => {
            let sent: Value = serde_json::from_slice(&body).unwrap_or_default();
            let text = sent["message"].as_str().unwrap_or_default().to_string();
            if text == "fail" {
                return json_resp(StatusCode::BAD_REQUEST, json!({ "error": "blocked" }));
            }
            json_resp(
                StatusCode::OK,
                json!({ "success": true, "message": { "id": "S1", "body": text, "fromMe": true, "ack": 1 } }),
            )
        }
        ("POST", "/api/chat/send-file/") => json_resp(StatusCode::OK, json!({ "success": true })),
        ("GET", "/api/chat/sse/") if sse_up => Response::builder()
            .status(StatusCode::OK)
            .header("Content-Type", "text/event-stream; charset=utf-8")
            .header("Cache-Control", "no-cache")
            .body(Full::new(Bytes::from_static(SSE_BODY.as_bytes())))
            .unwrap(),
        ("GET", "/api/chat/sse/") => json_resp(StatusCode::SERVICE_UNAVAILABLE, json!({ "error": "down" })),
        _ => json_resp(StatusCode::NOT_FOUND, json!({ "error": "not found" })),
    }
}

async fn spawn_gateway(sse_up: bool) -> (Config, Log) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let server_log = log.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let log = server_log.clone();
            tokio::spawn(async move {
                let svc = service_fn(move |req| {
                    let log = log.clone();
                    async move { Ok::<_, Infallible>(handle(req, log, sse_up).await) }
                });
                let _ = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), svc)
                    .await;
            });
        }
    });

    let config = Config {
        base_url: format!("http://{}", addr),
        csrf_token: Some("tok".to_string()),
        request_timeout: Duration::from_secs(5),
        ..Config::default()
    };
    (config, log)
}

fn last_request(log: &Log, path: &str) -> Recorded {
    log.lock()
        .unwrap()
        .iter()
        .rev()
        .find(|r| r.path == path)
        .cloned()
        .unwrap_or_else(|| panic!("no request to {}", path))
}

#[tokio::test]
async fn test_list_and_messages() {
    let (config, _log) = spawn_gateway(true).await;
    let api = HttpChatApi::new(&config).unwrap();

    let chats = api.list_chats().await.unwrap();
    assert_eq!(chats.len(), 1);
    assert_eq!(chats[0].id.as_str(), "5511@c.us");
    assert_eq!(chats[0].name, "Ana");
    assert_eq!(chats[0].unread, 2);
    assert_eq!(chats[0].last_message.as_ref().unwrap().id.as_str(), "m2");

    let messages = api.fetch_messages(&"5511@c.us".into()).await.unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[0].direction, Direction::Outbound);
    assert_eq!(messages[0].status, chat_sync_core::AckStatus::Read);
    assert!(messages.iter().all(|m| m.conversation_id.as_str() == "5511@c.us"));
    assert!(matches!(
        &messages[2].content,
        MessageContent::Media { caption: Some(c), .. } if c == "print"
    ));
}

#[tokio::test]
async fn test_post_endpoints_carry_csrf_token() {
    let (config, log) = spawn_gateway(true).await;
    let api = HttpChatApi::new(&config).unwrap();
    let conv = ConversationId::from("5511@c.us");

    api.mark_as_read(&conv).await.unwrap();
    let read = last_request(&log, "/api/chat/mark-as-read/");
    assert_eq!(read.csrf.as_deref(), Some("tok"));
    let body: Value = serde_json::from_slice(&read.body).unwrap();
    assert_eq!(body, json!({ "phone": "5511" }));

    let echo = api.send_message(&conv, "oi", Some(&"m2".into())).await.unwrap().unwrap();
    assert_eq!(echo.id.as_str(), "S1");
    assert!(echo.is_outbound());
    assert_eq!(echo.conversation_id, conv);
    let sent: Value = serde_json::from_slice(&last_request(&log, "/api/chat/send-message/").body).unwrap();
    assert_eq!(sent, json!({ "phone": "5511", "message": "oi", "replyTo": "m2" }));

    match api.send_message(&conv, "fail", None).await {
        Err(ChatError::Status { status, message }) => {
            assert_eq!(status, 400);
            assert_eq!(message, "blocked");
        }
        other => panic!("unexpected {:?}", other),
    }

    let anonymous = HttpChatApi::new(&Config {
        csrf_token: None,
        ..config
    })
    .unwrap();
    assert!(matches!(
        anonymous.mark_as_read(&conv).await,
        Err(ChatError::Status { status: 403, .. })
    ));
}

#[tokio::test]
async fn test_send_file_is_multipart() {
    let (config, log) = spawn_gateway(true).await;
    let api = HttpChatApi::new(&config).unwrap();
    let file = OutgoingFile::new("boleto.pdf", "application/pdf", Bytes::from_static(b"%PDF-1.4"));
    api.send_file(&"5511@c.us".into(), file).await.unwrap();

    let upload = last_request(&log, "/api/chat/send-file/");
    assert!(upload
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("multipart/form-data")));
    let body = String::from_utf8_lossy(&upload.body);
    assert!(body.contains("name=\"phone\""));
    assert!(body.contains("filename=\"boleto.pdf\""));
    assert!(body.contains("%PDF-1.4"));
    assert_eq!(upload.method, "POST");
}

#[tokio::test]
async fn test_profile_pic_and_download() {
    let (config, _log) = spawn_gateway(true).await;
    let api = HttpChatApi::new(&config).unwrap();

    let url = api.profile_pic(&"5511@c.us".into()).await.unwrap();
    assert_eq!(url.as_deref(), Some("https://pps.example/ana.jpg"));

    let media = api.download(&"m3".into()).await.unwrap();
    assert_eq!(media, Bytes::from_static(b"\x89PNG"));

    assert!(matches!(
        api.download(&"missing".into()).await,
        Err(ChatError::Status { status: 404, .. })
    ));
}

#[tokio::test]
async fn test_sse_transport_frames() {
    let (config, log) = spawn_gateway(true).await;
    let transport = SseTransport::new(&config).unwrap();

    let frames: Vec<PushFrame> = transport
        .connect()
        .await
        .unwrap()
        .map(|f| f.unwrap())
        .collect()
        .await;
    assert_eq!(frames.len(), 3);
    assert_eq!(frames[0], PushFrame::Heartbeat);
    assert_eq!(frames[1], PushFrame::Data("{\"type\":\"connected\"}".to_string()));
    assert!(matches!(&frames[2], PushFrame::Data(d) if d.contains("new_message")));

    assert_eq!(last_request(&log, "/api/chat/sse/").method, "GET");
}

#[tokio::test]
async fn test_sse_error_status_is_transport_error() {
    let (config, _log) = spawn_gateway(false).await;
    let transport = SseTransport::new(&config).unwrap();
    match transport.connect().await {
        Err(e) => assert!(e.is_transport()),
        Ok(_) => panic!("connect should fail"),
    }
}

#[tokio::test]
async fn test_engine_against_gateway() {
    let (config, log) = spawn_gateway(true).await;
    let api = Arc::new(HttpChatApi::new(&config).unwrap());
    let transport = Arc::new(SseTransport::new(&config).unwrap());
    let chat = ChatSync::spawn(config, api, transport);

    // The stub closes the stream after each burst, so the engine reconnects
    // and sees the same push again; it must count once
    let mut view = chat.snapshot().await.unwrap();
    for _ in 0..250 {
        let sse_hits = log
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == "/api/chat/sse/")
            .count();
        if view.conversations.len() == 2 && sse_hits >= 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        view = chat.snapshot().await.unwrap();
    }

    let pushed = view.conversation(&"5599@c.us".into()).expect("pushed conversation");
    assert_eq!(pushed.unread, 1);
    assert_eq!(pushed.preview.as_ref().unwrap().text, "chegou");
    assert_eq!(view.conversation(&"5511@c.us".into()).unwrap().unread, 2);

    chat.open_conversation("5511@c.us").unwrap();
    for _ in 0..250 {
        view = chat.snapshot().await.unwrap();
        if view.messages_loaded {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let ids: Vec<&str> = view.messages.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);

    chat.shutdown().await.unwrap();
}
