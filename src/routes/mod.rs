pub mod auth;
pub mod games;
pub mod health;
pub mod newsletter;
pub mod play;
pub mod referrals;
pub mod templates;
pub mod users;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use crate::{websocket, AppState};

pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health::health_check))
        .nest("/api", api_routes())
}

fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        // Auth
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::get_current_user))
        .route("/auth/change-password", post(auth::change_password))
        .route("/auth/forgot-password", post(auth::forgot_password))
        .route("/auth/reset-password", post(auth::reset_password))
        .route("/auth/logout", post(auth::logout))
        // Games
        .route("/games", get(games::list_games).post(games::create_game))
        .route(
            "/games/{id}",
            get(games::get_game)
                .put(games::update_game)
                .delete(games::delete_game),
        )
        .route("/games/{id}/apply-template", post(games::apply_template))
        .route("/games/{id}/duplicate", post(games::duplicate_game))
        // Templates
        .route(
            "/templates",
            get(templates::list_templates).post(templates::create_template),
        )
        .route("/templates/downloaded", get(templates::list_downloaded))
        .route(
            "/templates/from-game/{game_id}",
            post(templates::create_from_game),
        )
        .route(
            "/templates/{id}",
            get(templates::get_template)
                .put(templates::update_template)
                .delete(templates::delete_template),
        )
        .route("/templates/{id}/share", post(templates::share_template))
        // Marketplace
        .route("/marketplace", get(templates::list_marketplace))
        .route(
            "/marketplace/{id}/download",
            post(templates::download_template),
        )
        // Users
        .route(
            "/users/me",
            get(users::get_profile)
                .put(users::update_profile)
                .delete(users::delete_account),
        )
        .route("/dashboard", get(users::get_dashboard))
        // Referrals
        .route("/referrals", get(referrals::list_referrals))
        .route("/referrals/link", get(referrals::get_link))
        .route("/referrals/click/{code}", post(referrals::record_click))
        // Newsletter
        .route("/newsletter/subscribe", post(newsletter::subscribe))
        .route("/newsletter/unsubscribe", post(newsletter::unsubscribe))
        // Play
        .route("/play", post(play::start_session))
        .route("/play/code/{code}", get(play::get_session_by_code))
        .route(
            "/play/{session_id}",
            get(play::get_session).delete(play::end_session),
        )
        .route("/play/{session_id}/select", post(play::select_question))
        .route("/play/{session_id}/reveal", post(play::reveal_answer))
        .route("/play/{session_id}/team-select", post(play::team_select))
        .route("/play/{session_id}/award", post(play::award))
        .route("/play/{session_id}/skip", post(play::skip))
        .route("/play/{session_id}/back", post(play::back_to_board))
        .route("/play/{session_id}/adjust", post(play::adjust_score))
        .route("/play/{session_id}/ws", get(websocket::handle_websocket))
}

#[cfg(test)]
mod tests {
    use crate::{build_router, game::PlayState, models::GameContent, test_support, PlaySession};
    use axum::{
        body::Body,
        http::{header, Method, Request, StatusCode},
    };
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use uuid::Uuid;

    async fn send(
        app: axum::Router,
        method: Method,
        uri: &str,
        auth: Option<&str>,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(auth) = auth {
            builder = builder.header(header::AUTHORIZATION, auth);
        }
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };

        let response = app.oneshot(builder.body(body).unwrap()).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_health_check() {
        let app = build_router(test_support::test_state());
        let (status, body) = send(app, Method::GET, "/health", None, None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["service"], "compyy-backend");
    }

    #[tokio::test]
    async fn test_games_require_sign_in() {
        let app = build_router(test_support::test_state());
        let (status, body) = send(app, Method::GET, "/api/games", None, None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"], "unauthorized");
    }

    #[tokio::test]
    async fn test_garbage_token_rejected() {
        let app = build_router(test_support::test_state());
        let (status, _) = send(
            app,
            Method::GET,
            "/api/dashboard",
            Some("Bearer not-a-jwt"),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_email() {
        let app = build_router(test_support::test_state());
        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(serde_json::json!({
                "email": "nope",
                "username": "teacher_1",
                "password": "long enough"
            })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "validation_failed");
        assert_eq!(body["details"][0], "Enter a valid email address");
    }

    #[tokio::test]
    async fn test_create_game_with_unnamed_category_rejected() {
        let state = test_support::test_state();
        let auth = test_support::bearer(&state, Uuid::new_v4());
        let app = build_router(state);

        let (status, body) = send(
            app,
            Method::POST,
            "/api/games",
            Some(&auth),
            Some(serde_json::json!({
                "title": "Unit review",
                "content": {"categories": [{"name": "", "questions": []}]}
            })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["details"][0], "Category 1 needs a name");
    }

    #[tokio::test]
    async fn test_play_commands_over_http() {
        let state = test_support::test_state();
        let host_id = Uuid::new_v4();
        let auth = test_support::bearer(&state, host_id);

        let content: GameContent = serde_json::from_value(serde_json::json!({
            "categories": [{"name": "Math", "questions": [
                {"value": 100, "text": "2 + 2?", "answer": "4"}
            ]}]
        }))
        .unwrap();
        let play_state = PlayState::start(content, vec!["Owls".to_string()]).unwrap();
        let session_id = state.insert_play_session(PlaySession::new(
            Uuid::new_v4(),
            host_id,
            "Math".to_string(),
            play_state,
        ));
        let app = build_router(state);

        let uri = |action: &str| format!("/api/play/{}/{}", session_id, action);

        let (status, body) = send(
            app.clone(),
            Method::POST,
            &uri("select"),
            Some(&auth),
            Some(serde_json::json!({"category": 0, "question": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "question");
        assert!(body["answer"].is_null());

        let (_, body) = send(app.clone(), Method::POST, &uri("reveal"), Some(&auth), None).await;
        assert_eq!(body["answer"], "4");

        let (_, body) =
            send(app.clone(), Method::POST, &uri("team-select"), Some(&auth), None).await;
        assert_eq!(body["state"], "team_select");

        let (status, body) = send(
            app.clone(),
            Method::POST,
            &uri("award"),
            Some(&auth),
            Some(serde_json::json!({"team": 0})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["state"], "complete");
        assert_eq!(body["teams"][0]["score"], 100);

        let (status, body) = send(app, Method::POST, &uri("skip"), Some(&auth), None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "The game is already complete");
    }

    #[tokio::test]
    async fn test_register_twice_is_conflict() {
        let Some(pool) = test_support::database().await else {
            return;
        };
        let app = build_router(test_support::state_with_pool(pool));
        let id = Uuid::new_v4().simple().to_string();
        let email = format!("{}@school.edu", id);

        let (status, body) = send(
            app.clone(),
            Method::POST,
            "/api/auth/register",
            None,
            Some(serde_json::json!({
                "email": email,
                "username": format!("a_{}", &id[..16]),
                "password": "long enough"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["email"], email);

        // Same address in another case, different username
        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/register",
            None,
            Some(serde_json::json!({
                "email": email.to_uppercase(),
                "username": format!("b_{}", &id[..16]),
                "password": "long enough"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["message"], "An account with this email already exists");
    }

    #[tokio::test]
    async fn test_login_failures_look_the_same() {
        let Some(pool) = test_support::database().await else {
            return;
        };
        let app = build_router(test_support::state_with_pool(pool));
        let id = Uuid::new_v4().simple().to_string();
        let email = format!("{}@school.edu", id);

        let (status, _) = send(
            app.clone(),
            Method::POST,
            "/api/auth/register",
            None,
            Some(serde_json::json!({
                "email": email,
                "username": format!("c_{}", &id[..16]),
                "password": "long enough"
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let attempts = [
            (email.clone(), "wrong password"),
            (format!("nobody_{}", email), "long enough"),
        ];
        for (email, password) in attempts {
            let (status, body) = send(
                app.clone(),
                Method::POST,
                "/api/auth/login",
                None,
                Some(serde_json::json!({"email": email, "password": password})),
            )
            .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
            assert_eq!(body["message"], "Invalid email or password");
        }

        let (status, body) = send(
            app,
            Method::POST,
            "/api/auth/login",
            None,
            Some(serde_json::json!({"email": email, "password": "long enough"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["token"].is_string());
    }

    #[tokio::test]
    async fn test_forgot_password_accepts_known_and_unknown_emails() {
        let Some(pool) = test_support::database().await else {
            return;
        };
        let app = build_router(test_support::state_with_pool(pool));
        let id = Uuid::new_v4().simple().to_string();
        let email = format!("{}@school.edu", id);

        send(
            app.clone(),
            Method::POST,
            "/api/auth/register",
            None,
            Some(serde_json::json!({
                "email": email,
                "username": format!("d_{}", &id[..16]),
                "password": "long enough"
            })),
        )
        .await;

        for email in [email.clone(), format!("nobody_{}", email)] {
            let (status, body) = send(
                app.clone(),
                Method::POST,
                "/api/auth/forgot-password",
                None,
                Some(serde_json::json!({"email": email})),
            )
            .await;
            assert_eq!(status, StatusCode::ACCEPTED);
            assert_eq!(
                body["message"],
                "If an account exists for that email, a reset link is on its way"
            );
        }
    }

    #[tokio::test]
    async fn test_unknown_play_session_is_not_found() {
        let state = test_support::test_state();
        let auth = test_support::bearer(&state, Uuid::new_v4());
        let app = build_router(state);

        let uri = format!("/api/play/{}", Uuid::new_v4());
        let (status, body) = send(app, Method::GET, &uri, Some(&auth), None).await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Play session not found");
    }
}
