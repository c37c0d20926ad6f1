// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Health endpoint.

use axum::Json;
use serde_json::{json, Value};

/// GET /health - liveness check.
pub async fn check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "terrabim-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
