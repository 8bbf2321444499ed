//! Success envelope.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

/// `{success: true, data}` with a status code.
#[derive(Debug)]
pub struct ApiResponse<T> {
    status: StatusCode,
    data: T,
}

#[derive(Serialize)]
struct Envelope<T> {
    success: bool,
    data: T,
}

impl<T: Serialize> ApiResponse<T> {
    /// 200 OK.
    pub const fn ok(data: T) -> Self {
        Self {
            status: StatusCode::OK,
            data,
        }
    }

    /// 201 Created.
    pub const fn created(data: T) -> Self {
        Self {
            status: StatusCode::CREATED,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(Envelope {
                success: true,
                data: self.data,
            }),
        )
            .into_response()
    }
}
