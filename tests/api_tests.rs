mod common;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
    response::Response,
};
use common::{PASSWORD, TestContext};
use http_body_util::BodyExt;
use tower::ServiceExt;

/// Drives the router like a browser: follows nothing, but keeps the session cookie.
struct Browser {
    app: Router,
    cookie: Option<String>,
}

impl Browser {
    fn new(ctx: &TestContext) -> Self {
        let state = warden::api::create_app_state(ctx.state.clone(), None);
        Self {
            app: warden::api::router(state),
            cookie: None,
        }
    }

    async fn send(&mut self, request: Request<Body>) -> Response {
        let response = self.app.clone().oneshot(request).await.unwrap();
        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
            self.cookie = Some(pair.to_string());
        }
        response
    }

    async fn get(&mut self, uri: &str) -> Response {
        let mut builder = Request::builder().uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    async fn post(&mut self, uri: &str, fields: &[(&str, &str)]) -> Response {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded");
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        self.send(builder.body(Body::from(body)).unwrap()).await
    }

    async fn json(&mut self, uri: &str) -> serde_json::Value {
        let response = self.get(uri).await;
        assert_eq!(response.status(), StatusCode::OK, "GET {uri}");
        body_json(response).await
    }

    async fn login(&mut self, email: &str, password: &str) -> Response {
        self.post(
            "/account/login",
            &[("email", email), ("password", password)],
        )
        .await
    }
}

async fn body_json(response: Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .expect("Redirect without Location")
        .to_str()
        .unwrap()
}

fn assert_redirect(response: &Response, to: &str) {
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(response), to);
}

#[tokio::test]
async fn test_health() {
    let ctx = TestContext::new().await;
    let mut browser = Browser::new(&ctx);

    let response = browser.get("/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        mime::APPLICATION_JSON.as_ref()
    );

    let body = body_json(response).await;
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["database"], true);
}

#[tokio::test]
async fn test_login_flow_with_flash_messages() {
    let mut ctx = TestContext::new().await;
    let user = ctx.register_activated("web@x.com").await;
    let mut browser = Browser::new(&ctx);

    let response = browser.login("web@x.com", "wrong password").await;
    assert_redirect(&response, "/account/login");

    let page = browser.json("/account/messages").await;
    assert_eq!(page["data"]["messages"][0]["level"], "error");
    assert_eq!(
        page["data"]["messages"][0]["message"],
        "Invalid email or password"
    );
    assert_eq!(page["data"]["old_input"]["email"], "web@x.com");
    assert!(page["data"]["user"].is_null());

    // Messages are consumed on read.
    let page = browser.json("/account/messages").await;
    assert!(page["data"]["messages"].as_array().unwrap().is_empty());

    let response = browser.login("web@x.com", PASSWORD).await;
    assert_redirect(&response, "/account");

    let account = browser.json("/account").await;
    assert_eq!(account["data"]["user"]["id"], user.id.value());
    assert_eq!(account["data"]["user"]["status"]["state"], "normal");

    let response = browser.get("/account/logout").await;
    assert_redirect(&response, "/account/login");

    let response = browser.get("/account").await;
    assert_redirect(&response, "/account/login");
}

#[tokio::test]
async fn test_missing_login_fields() {
    let ctx = TestContext::new().await;
    let mut browser = Browser::new(&ctx);

    let response = browser.post("/account/login", &[("email", "x@x.com")]).await;
    assert_redirect(&response, "/account/login");

    let page = browser.json("/account/messages").await;
    assert_eq!(page["data"]["messages"][0]["level"], "error");
}

#[tokio::test]
async fn test_protected_route_remembers_target() {
    let mut ctx = TestContext::new().await;
    ctx.create_admin("boss@x.com").await;
    let mut browser = Browser::new(&ctx);

    let response = browser.get("/admin/users?page=1").await;
    assert_redirect(&response, "/account/login");

    let response = browser.login("boss@x.com", PASSWORD).await;
    assert_redirect(&response, "/admin/users?page=1");

    let users = browser.json("/admin/users?page=1").await;
    assert_eq!(users["data"]["total"], 1);
    assert_eq!(users["data"]["users"][0]["email"], "boss@x.com");
}

#[tokio::test]
async fn test_admin_routes_require_permission() {
    let mut ctx = TestContext::new().await;
    ctx.register_activated("plain@x.com").await;
    let mut browser = Browser::new(&ctx);

    browser.login("plain@x.com", PASSWORD).await;

    let response = browser.get("/admin/users").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let response = browser.get("/metrics").await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_register_and_activate_over_http() {
    let mut ctx = TestContext::new().await;
    let mut browser = Browser::new(&ctx);

    let response = browser
        .post(
            "/account/register",
            &[
                ("email", "new@x.com"),
                ("first_name", "Barbara"),
                ("last_name", "Liskov"),
                ("password", PASSWORD),
                ("password_confirmation", PASSWORD),
            ],
        )
        .await;
    assert_redirect(&response, "/account/login");

    let mail = ctx.next_mail().await;
    let path = format!("/account/activate/{}/{}", mail.user_id, mail.code);
    assert!(mail.link.ends_with(&path));

    let response = browser.get(&path).await;
    assert_redirect(&response, "/account/login");

    let page = browser.json("/account/messages").await;
    assert_eq!(page["data"]["messages"][0]["level"], "success");

    let response = browser.login("new@x.com", PASSWORD).await;
    assert_redirect(&response, "/account");
}

#[tokio::test]
async fn test_register_failure_preserves_input() {
    let mut ctx = TestContext::new().await;
    ctx.register("taken@x.com").await;
    let mut browser = Browser::new(&ctx);

    let response = browser
        .post(
            "/account/register",
            &[
                ("email", "taken@x.com"),
                ("first_name", "Barbara"),
                ("last_name", "Liskov"),
                ("password", PASSWORD),
                ("password_confirmation", PASSWORD),
            ],
        )
        .await;
    assert_redirect(&response, "/account/register");

    let page = browser.json("/account/messages").await;
    assert_eq!(page["data"]["old_input"]["first_name"], "Barbara");
    assert!(page["data"]["old_input"].get("password").is_none());
}

#[tokio::test]
async fn test_password_reset_over_http() {
    let mut ctx = TestContext::new().await;
    let user = ctx.register_activated("forgot@x.com").await;
    let mut browser = Browser::new(&ctx);

    let response = browser
        .post("/account/forgot-password", &[("email", "forgot@x.com")])
        .await;
    assert_redirect(&response, "/account/login");

    let mail = ctx.next_mail().await;
    let path = format!("/account/forgot-password/{}/{}", user.id, mail.code);

    let status = browser.json(&path).await;
    assert_eq!(status["data"]["valid"], true);

    let response = browser
        .post(
            &path,
            &[
                ("password", "a whole new secret"),
                ("password_confirmation", "a whole new secret"),
            ],
        )
        .await;
    assert_redirect(&response, "/account/login");

    // The code is spent.
    let response = browser.get(&path).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = browser.login("forgot@x.com", "a whole new secret").await;
    assert_redirect(&response, "/account");
}

#[tokio::test]
async fn test_admin_manages_users_over_http() {
    let mut ctx = TestContext::new().await;
    let admin = ctx.create_admin("boss@x.com").await;
    let mut browser = Browser::new(&ctx);
    browser.login("boss@x.com", PASSWORD).await;

    let response = browser
        .post(
            "/admin/groups/create",
            &[("name", "Support"), ("permissions", "tickets.view, tickets.close")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let group_path = location(&response).to_string();
    let group_id = group_path.rsplit('/').next().unwrap().to_string();

    let response = browser
        .post(
            "/admin/users/create",
            &[
                ("email", "agent@x.com"),
                ("first_name", "Frances"),
                ("last_name", "Allen"),
                ("password", PASSWORD),
                ("password_confirmation", PASSWORD),
                ("activated", "on"),
                ("groups", &group_id),
                ("permissions", "tickets.close=deny"),
            ],
        )
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let user_path = location(&response).to_string();

    let detail = browser.json(&user_path).await;
    assert_eq!(detail["data"]["user"]["activated"], true);
    assert_eq!(detail["data"]["groups"][0]["name"], "Support");
    assert_eq!(
        detail["data"]["effective_permissions"]["tickets.view"],
        true
    );
    assert_eq!(
        detail["data"]["effective_permissions"]["tickets.close"],
        false
    );

    let group = browser.json(&group_path).await;
    assert_eq!(group["data"]["members"][0]["email"], "agent@x.com");

    // Drain the success messages collected so far.
    browser.json("/account/messages").await;

    // Deleting yourself is refused with a flash, not an error page.
    let own_delete = format!("/admin/users/{}/delete", admin.id);
    let response = browser.post(&own_delete, &[]).await;
    assert_redirect(&response, "/admin/users");
    let page = browser.json("/account/messages").await;
    assert_eq!(page["data"]["messages"][0]["level"], "error");

    let response = browser.post(&format!("{user_path}/delete"), &[]).await;
    assert_redirect(&response, "/admin/users");

    let response = browser.get(&user_path).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
