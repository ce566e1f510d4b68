//! Response serializers for object results.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerError;
use crate::http::HttpContext;
use crate::lifecycle::CancellationSignal;

/// Writes a controller's object result into the response.
#[async_trait]
pub trait ResponseSerializer: Send + Sync + 'static {
    async fn serialize(
        &self,
        ctx: &HttpContext,
        value: Value,
        cancel: &CancellationSignal,
    ) -> Result<(), HandlerError>;
}

/// `application/json` bodies.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer {
    pub pretty: bool,
}

#[async_trait]
impl ResponseSerializer for JsonSerializer {
    async fn serialize(
        &self,
        ctx: &HttpContext,
        value: Value,
        _cancel: &CancellationSignal,
    ) -> Result<(), HandlerError> {
        let text = if self.pretty {
            serde_json::to_string_pretty(&value)
        } else {
            serde_json::to_string(&value)
        }
        .map_err(HandlerError::unhandled)?;
        ctx.response().write_text(&text, "application/json");
        Ok(())
    }
}

/// Strings as `text/plain`; everything else as JSON.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextSerializer;

#[async_trait]
impl ResponseSerializer for TextSerializer {
    async fn serialize(
        &self,
        ctx: &HttpContext,
        value: Value,
        cancel: &CancellationSignal,
    ) -> Result<(), HandlerError> {
        match value {
            Value::String(text) => {
                ctx.response().write_text(&text, "text/plain; charset=utf-8");
                Ok(())
            }
            other => JsonSerializer::default().serialize(ctx, other, cancel).await,
        }
    }
}
