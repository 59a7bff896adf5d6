//! Minimal rivet service: typed inputs, coded errors, a raw CSV download.
//!
//! Run with:
//!   RUST_LOG=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/users/1
//!   curl http://localhost:3000/users/7
//!   curl -H 'accept: application/xml' http://localhost:3000/users/1
//!   curl -X POST http://localhost:3000/users -d '{"name":"alice"}'
//!   curl -X POST http://localhost:3000/users -d '{"name":""}'
//!   curl http://localhost:3000/users.csv

use std::collections::BTreeMap;
use std::io::Write;
use std::sync::{Arc, LazyLock, Mutex};

use http::Method;
use rivet::errors::{BoxError, Coder, Key, ResultExt};
use rivet::{closer, Binding, Field, FieldError, FieldKind, In, Input, ResponseWriter, Router, Server};

static USER_NOT_FOUND: LazyLock<Coder> = LazyLock::new(|| {
    Coder::new("USER_NOT_FOUND").with_http_code(404).with_message("no such user")
});

const USER_ID: Key<u64> = Key::new("user_id");

type Store = Arc<Mutex<BTreeMap<u64, String>>>;

static USERS: LazyLock<Store> = LazyLock::new(|| {
    Arc::new(Mutex::new(BTreeMap::from([(1, "ada".to_owned())])))
});

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct GetUser {
    id: u64,
}

impl Input for GetUser {
    fn binding() -> Binding {
        Binding::Fields(vec![Field::path("id").kind(FieldKind::Integer)])
    }
}

#[derive(serde::Deserialize, schemars::JsonSchema)]
struct CreateUser {
    name: String,
}

impl Input for CreateUser {
    fn validate(&self) -> Result<(), FieldError> {
        if self.name.trim().is_empty() {
            return Err(FieldError::new("name", "must not be empty"));
        }
        Ok(())
    }
}

#[derive(serde::Serialize, schemars::JsonSchema)]
struct User {
    id: u64,
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), rivet::Error> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let app = Router::new()
        .on(Method::GET,  "/users/{id}", get_user)
        .on(Method::POST, "/users",      create_user)
        .on(Method::GET,  "/users.csv",  export_users);

    for route in app.handlers() {
        tracing::info!(method = %route.method, path = %route.path, handler = route.meta.handler.name, "route");
    }

    closer::global().register("user store", || {
        let users = USERS.lock().map_err(|e| e.to_string())?;
        tracing::info!(count = users.len(), "dropping user store");
        Ok::<(), String>(())
    });

    Server::bind("0.0.0.0:3000").serve(app).await
}

// GET /users/{id}
async fn get_user(In(req): In<GetUser>) -> Result<User, BoxError> {
    let users = USERS.lock().map_err(|e| e.to_string())?;
    let name = users
        .get(&req.id)
        .cloned()
        .ok_or_else(|| USER_NOT_FOUND.wrap(format!("user {} is not stored", req.id)))
        .with_bag(USER_ID, req.id)?;
    Ok(User { id: req.id, name })
}

// POST /users
async fn create_user(In(req): In<CreateUser>) -> Result<User, BoxError> {
    let mut users = USERS.lock().map_err(|e| e.to_string())?;
    let id = users.keys().next_back().map_or(1, |last| last + 1);
    users.insert(id, req.name.clone());
    Ok(User { id, name: req.name })
}

// GET /users.csv, written by hand
async fn export_users(mut w: ResponseWriter) {
    let rows: Vec<(u64, String)> = match USERS.lock() {
        Ok(users) => users.iter().map(|(id, name)| (*id, name.clone())).collect(),
        Err(_) => {
            w.set_status(http::StatusCode::SERVICE_UNAVAILABLE);
            return;
        }
    };

    w.set_content_type("text/csv");
    let _ = writeln!(w, "id,name");
    for (id, name) in rows {
        let _ = writeln!(w, "{id},{name}");
    }
}
