use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, patch, post, put};
use axum::Router;
use socketioxide::extract::SocketRef;
use socketioxide::SocketIo;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use courtside_api::config::AppConfig;
use courtside_api::{routes, socket, AppState};
use courtside_shared::clients::db::create_pool;
use courtside_shared::clients::email::EmailClient;
use courtside_shared::clients::media::MediaClient;
use courtside_shared::clients::redis::RedisClient;
use courtside_shared::clients::storage::StorageClient;
use courtside_shared::clients::stripe::StripeClient;
use courtside_shared::middleware::{init_metrics, init_tracing, metrics_middleware};

const UPLOAD_LIMIT: usize = 200 * 1024 * 1024;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing("courtside-api");

    let config = AppConfig::load()?;
    let port = config.port;

    let db = create_pool(&config.database_url, 10)?;
    let redis = RedisClient::connect(&config.redis_url).await?;
    let metrics_handle = init_metrics()?;

    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(120))
        .build()?;

    let email = EmailClient::new(http_client.clone(), &config.resend_api_key, &config.from_email, "Courtside");
    let media = MediaClient::new(http_client.clone(), &config.media_service_url);
    let stripe = StripeClient::new(http_client.clone(), &config.stripe_secret_key);
    let storage = StorageClient::new(&config.storage_settings());

    // io lives in AppState so REST handlers can push notifications
    let (sio_layer, io) = SocketIo::builder().build_layer();

    let state = Arc::new(AppState {
        db,
        config,
        redis,
        email,
        storage,
        media,
        stripe,
        io: io.clone(),
        http_client,
        metrics_handle,
    });

    io.ns("/", {
        let state = state.clone();
        move |socket: SocketRef| {
            let state = state.clone();
            async move {
                socket::on_connect(socket, state).await;
            }
        }
    });

    let app = Router::new()
        // Health
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::health::metrics))
        // Auth
        .route("/auth/register", post(routes::auth::register))
        .route("/auth/login", post(routes::auth::login))
        .route("/auth/refresh-token", post(routes::auth::refresh_token))
        .route("/auth/logout", post(routes::auth::logout))
        .route("/auth/change-password", patch(routes::auth::change_password))
        .route("/auth/update-profile", patch(routes::auth::update_profile))
        .route("/auth/update-profile/image", patch(routes::auth::update_profile_image)
            .layer(DefaultBodyLimit::max(UPLOAD_LIMIT)))
        .route("/auth/forgot-password", post(routes::auth::forgot_password))
        .route("/auth/verify-otp", post(routes::auth::verify_otp))
        .route("/auth/forget-reset-password", post(routes::auth::reset_password))
        .route("/auth/verify-email", post(routes::auth::verify_email))
        .route("/auth/resend-otp", post(routes::auth::resend_otp))
        .route("/auth/me", get(routes::auth::me))
        .route("/auth/me/stats", get(routes::auth::my_stats))
        .route("/auth/users", get(routes::auth::list_users))
        .route("/auth/users/:id", get(routes::auth::public_profile))
        .route("/auth/profile-view/:id", patch(routes::auth::profile_view))
        .route("/auth/login-sessions", get(routes::auth::login_sessions))
        // Posts
        .route("/post", get(routes::post::list_posts))
        .route("/post/create", post(routes::post::create_post)
            .layer(DefaultBodyLimit::max(UPLOAD_LIMIT)))
        .route("/post/feed", get(routes::post::post_feed))
        .route("/post/user", get(routes::post::my_posts))
        .route("/post/user/:user_id", get(routes::post::user_posts))
        .route("/post/update/:id", patch(routes::post::update_post)
            .layer(DefaultBodyLimit::max(UPLOAD_LIMIT)))
        .route("/post/delete/:id", delete(routes::post::delete_post))
        .route("/post/:id", get(routes::post::get_post))
        .route("/post/:id/seen", post(routes::post::mark_seen))
        .route("/post/:id/like", post(routes::post::toggle_like))
        // Comments
        .route("/comment", post(routes::comment::create_comment))
        .route("/comment/reply", post(routes::comment::reply))
        .route("/comment/post/:post_id", get(routes::comment::post_comments))
        .route("/comment/tree/post/:post_id", get(routes::comment::comment_tree))
        .route("/comment/update/:id", put(routes::comment::update_comment))
        .route("/comment/delete/:id", delete(routes::comment::delete_comment))
        // Feed
        .route("/post-reel/feeds", get(routes::feed::smart_feed))
        .route("/post-reel/my-feeds", get(routes::feed::my_feed))
        .route("/post-reel/:id/like", post(routes::feed::toggle_like))
        .route("/post-reel/:id/seen", post(routes::feed::mark_seen))
        // Highlights
        .route("/highlights", get(routes::highlights::list_highlights))
        .route("/highlights/merge-video", post(routes::highlights::merge_video)
            .layer(DefaultBodyLimit::max(UPLOAD_LIMIT)))
        .route("/highlights/remove-clip", delete(routes::highlights::remove_clip))
        .route("/highlights/like/:id", patch(routes::highlights::toggle_like))
        .route("/highlights/deleteHighlights/:id", delete(routes::highlights::delete_highlight))
        .route("/highlights/:id", get(routes::highlights::get_highlight))
        // Notifications
        .route("/notifications", get(routes::notifications::list_notifications))
        .route("/notifications/unread", get(routes::notifications::list_unread))
        .route("/notifications/read", get(routes::notifications::list_read))
        .route("/notifications/unread-count", get(routes::notifications::unread_count))
        .route("/notifications/read-all", patch(routes::notifications::mark_all_read))
        .route("/notifications/:id/read", patch(routes::notifications::mark_read))
        // Chat
        .route("/chat/start/:receiver_id", post(routes::chat::start_chat))
        .route("/chat/history/:contact_id", get(routes::chat::history))
        .route("/chat/list", get(routes::chat::list_conversations))
        .route("/chat/upload", post(routes::chat::upload_files)
            .layer(DefaultBodyLimit::max(UPLOAD_LIMIT)))
        // Organizations
        .route("/organization", post(routes::organization::create_organization))
        .route("/organization/all", get(routes::organization::list_organizations))
        .route("/organization/details/:id", get(routes::organization::organization_details))
        .route("/organization/track/:code", patch(routes::organization::track_click))
        .route("/organization/update-image/:id", patch(routes::organization::update_image)
            .layer(DefaultBodyLimit::max(UPLOAD_LIMIT)))
        // Admin
        .route("/admin/users", get(routes::admin::list_users))
        .route("/admin/manage-user/:user_id", post(routes::admin::manage_user))
        .route("/admin/user-details/:user_id", get(routes::admin::user_details))
        .route("/admin/userDetails/:id", get(routes::admin::user_overview))
        .route("/admin/dashboard-stats", get(routes::admin::dashboard_stats))
        .route("/admin/add-user", post(routes::admin::add_user))
        .route("/admin/stats/subscribers", get(routes::admin::subscriber_stats))
        // Billing
        .route("/stripe/product-and-price", post(routes::stripe::create_plan))
        .route("/stripe/create-checkout-session", post(routes::stripe::create_checkout_session))
        .route("/stripe/plans", get(routes::stripe::list_plans))
        .route("/stripe/plans/:id", patch(routes::stripe::update_plan))
        .route("/stripe/webhook", post(routes::stripe::webhook))
        .route("/stripe/get-all-subscription", get(routes::stripe::all_subscriptions))
        .route("/stripe/subscriptionDetails/:subscription_id", get(routes::stripe::subscription_details))
        .route("/stripe/me/transactions", get(routes::stripe::my_transactions))
        .route("/stripe/me/current-plan", get(routes::stripe::current_plan))
        .route("/stripe/admin/transactions", get(routes::stripe::all_transactions))
        .route("/stripe/dashboard-stats", get(routes::stripe::dashboard_stats))
        .layer(axum::middleware::from_fn(metrics_middleware))
        .layer(CompressionLayer::new())
        .layer(sio_layer)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "courtside-api starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}
