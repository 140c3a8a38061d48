// src/routes.rs

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{
    handlers::{admin, attempt, auth, credit, question_set},
    state::AppState,
    utils::jwt::{admin_middleware, auth_middleware, student_middleware},
};

/// Assembles the main application router.
///
/// * Public: auth.
/// * Any logged-in user: catalog browsing.
/// * Students: attempts and credits.
/// * Admins: catalog management, credit grants, manual grading.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
        ])
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([
            axum::http::header::AUTHORIZATION,
            axum::http::header::CONTENT_TYPE,
        ]);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login));

    let question_set_routes = Router::new()
        .route("/", get(question_set::list_question_sets))
        .route("/{id}", get(question_set::get_question_set))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let attempt_routes = Router::new()
        .route("/history", get(attempt::list_history))
        .route("/{id}/start", post(attempt::start_attempt))
        .route(
            "/answer/{attempt_id}/{question_id}",
            post(attempt::answer_question),
        )
        .route("/{id}/finish", put(attempt::finish_attempt))
        .route("/{id}", get(attempt::get_attempt))
        // Auth first, then role check
        .layer(middleware::from_fn(student_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let credit_routes = Router::new()
        .route("/balance", get(credit::get_balance))
        .route("/transactions", get(credit::list_transactions))
        .route("/purchase/{question_set_id}", post(credit::purchase_question_set))
        .route("/access/{question_set_id}", get(credit::check_access))
        .layer(middleware::from_fn(student_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    let admin_routes = Router::new()
        .route(
            "/categories",
            get(admin::list_categories).post(admin::create_category),
        )
        .route("/question-sets", post(admin::create_question_set))
        .route("/question-sets/{id}/publish", put(admin::publish_question_set))
        .route("/credits/grant", post(admin::grant_credits))
        .route("/attempts/{attempt_id}/answers", get(admin::list_attempt_answers))
        .route("/question-attempts/{id}/grade", put(admin::grade_answer))
        .layer(middleware::from_fn(admin_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api/question-sets", question_set_routes)
        .nest("/api/question-set-attempt", attempt_routes)
        .nest("/api/credits", credit_routes)
        .nest("/api/admin", admin_routes)
        // Global Middleware (applied from outside in)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
