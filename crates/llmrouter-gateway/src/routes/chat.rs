//! `POST /api/v1/chat/completions`: the one request-facing endpoint. Thin
//! glue -- deserializes the body, calls into the router, and writes either
//! a JSON body or an SSE stream.

use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use llmrouter_core::models::chat::ChatCompletionRequest;
use llmrouter_core::services::router::Router;
use log::warn;
use serde_json::json;

use crate::error::HttpRouterError;

pub async fn chat_completions(
    router: web::Data<Router>,
    body: web::Json<ChatCompletionRequest>,
) -> HttpResponse {
    let req = body.into_inner();

    if req.stream {
        return stream_completion(router, req).await;
    }

    match router.route_buffered(req, None).await {
        Ok(response) => HttpResponse::Ok().json(response),
        Err(e) => HttpRouterError::from(e).into_response(),
    }
}

async fn stream_completion(router: web::Data<Router>, req: ChatCompletionRequest) -> HttpResponse {
    let (routing, mut chunks) = match router.route_streaming(req, None).await {
        Ok(pair) => pair,
        Err(e) => return HttpRouterError::from(e).into_response(),
    };

    let sse = async_stream::stream! {
        let mut first = true;
        loop {
            match chunks.next().await {
                Some(Ok(chunk)) => {
                    let mut frame = json!({
                        "id": chunk.id,
                        "object": "chat.completion.chunk",
                        "model": chunk.model,
                        "choices": [{
                            "index": 0,
                            "delta": {
                                "role": chunk.delta.role,
                                "content": chunk.delta.content,
                                "tool_calls": chunk.delta.tool_calls,
                            },
                            "finish_reason": chunk.finish_reason,
                        }],
                    });
                    if first {
                        frame["_router"] = serde_json::to_value(&routing).unwrap_or_default();
                        first = false;
                    }
                    yield Ok::<_, actix_web::Error>(web::Bytes::from(format!("data: {}\n\n", frame)));
                }
                Some(Err(e)) => {
                    warn!("stream terminated mid-flow: {}", e.message);
                    let frame = json!({"error": {"message": e.message}});
                    yield Ok(web::Bytes::from(format!("data: {}\n\n", frame)));
                    break;
                }
                None => {
                    yield Ok(web::Bytes::from_static(b"data: [DONE]\n\n"));
                    break;
                }
            }
        }
    };

    HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(sse)
}
