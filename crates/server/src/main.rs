//! Catalog Server
//!
//! Axum server exposing the catalog screen over a JSON API with a live SSE
//! feed, plus one-shot CLI commands against the same screen controller.

mod cli;

use axum::{
    body::Body,
    extract::{Path, Query, State},
    http::{header, Response, StatusCode},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json,
    },
    routing::{delete, get, patch, post},
    Router,
};
use catalog_core::config::{BackendKind, CatalogConfig};
use catalog_core::events::CatalogEvent;
use catalog_core::screen::{
    CatalogScreen, DeleteOutcome, DeletePrompt, FormField, NoticeLevel, Preconfirmed,
    ScreenState, SubmitOutcome,
};
use catalog_core::store::{self, Subscription};
use catalog_core::ScreenError;
use clap::{Parser, Subcommand};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::{convert::Infallible, net::SocketAddr, sync::Arc};
use tokio::{
    net::TcpListener,
    sync::{broadcast, Mutex},
};
use utoipa::{OpenApi, ToSchema};

/// Application state
struct AppState {
    screen: Mutex<CatalogScreen>,
    event_tx: broadcast::Sender<CatalogEvent>,
}

type SharedState = Arc<AppState>;

// === API Types ===

#[derive(Debug, Serialize, ToSchema)]
struct ApiResponse {
    success: bool,
    message: String,
}

/// One catalog entry as listed
#[derive(Debug, Serialize, ToSchema)]
struct EntryResponse {
    id: String,
    products_name: String,
    products_type: String,
    products_price: Option<i64>,
    image_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
struct FormResponse {
    name: String,
    product_type: String,
    price: String,
    image_url: String,
}

#[derive(Debug, Serialize, ToSchema)]
struct NoticeResponse {
    level: String,
    message: String,
}

/// Everything the screen currently shows
#[derive(Debug, Serialize, ToSchema)]
struct ScreenResponse {
    title: String,
    submit_label: String,
    editing: Option<String>,
    form: FormResponse,
    notice: Option<NoticeResponse>,
    entries: Vec<EntryResponse>,
}

#[derive(Deserialize, ToSchema)]
struct UpdateFormRequest {
    name: Option<String>,
    product_type: Option<String>,
    price: Option<String>,
    image_url: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
struct SubmitResponse {
    success: bool,
    id: String,
    created: bool,
    message: String,
}

#[derive(Deserialize)]
struct DeleteQuery {
    #[serde(default)]
    confirm: bool,
}

#[derive(Debug, Serialize, ToSchema)]
struct ConfirmationRequired {
    id: String,
    title: String,
    message: String,
}

type ApiError = (StatusCode, Json<ApiResponse>);

#[derive(Parser, Clone)]
#[command(author, version, about = "Catalog - product catalog on a real-time database")]
struct Args {
    /// Store backend (realtime, sqlite, memory)
    #[arg(long, global = true)]
    backend: Option<BackendKind>,
    /// Config file (defaults to .catalog/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Start the catalog API server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },
    /// Print the current product list
    List,
    /// Add a new product
    Add {
        #[arg(long)]
        name: String,
        #[arg(long = "type")]
        product_type: String,
        #[arg(long)]
        price: String,
        /// Image URI
        #[arg(long)]
        image: Option<String>,
    },
    /// Edit an existing product; omitted fields keep their value
    Edit {
        id: String,
        #[arg(long)]
        name: Option<String>,
        #[arg(long = "type")]
        product_type: Option<String>,
        #[arg(long)]
        price: Option<String>,
        #[arg(long)]
        image: Option<String>,
    },
    /// Delete a product after confirmation
    Delete {
        id: String,
        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },
    /// Follow the product list live
    Watch,
}

// === OpenAPI Definition ===

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Catalog API",
        version = "1.0.0",
        description = "Product catalog screen backed by a real-time database"
    ),
    paths(
        get_screen,
        update_form,
        submit_form,
        begin_edit,
        cancel_edit,
        delete_entry
    ),
    components(
        schemas(
            ApiResponse,
            EntryResponse,
            FormResponse,
            NoticeResponse,
            ScreenResponse,
            UpdateFormRequest,
            SubmitResponse,
            ConfirmationRequired
        )
    ),
    tags(
        (name = "catalog", description = "Catalog screen")
    )
)]
struct ApiDoc;

// === Response Mapping ===

fn screen_response(state: &ScreenState) -> ScreenResponse {
    ScreenResponse {
        title: state.title().to_string(),
        submit_label: state.submit_label().to_string(),
        editing: state.editing.clone(),
        form: FormResponse {
            name: state.form.name.clone(),
            product_type: state.form.product_type.clone(),
            price: state.form.price.clone(),
            image_url: state.form.image_url.clone(),
        },
        notice: state.notice.as_ref().map(|n| NoticeResponse {
            level: match n.level {
                NoticeLevel::Info => "info",
                NoticeLevel::Error => "error",
            }
            .to_string(),
            message: n.message.clone(),
        }),
        entries: state
            .entries
            .iter()
            .map(|e| EntryResponse {
                id: e.id.clone(),
                products_name: e.record.name.clone(),
                products_type: e.record.product_type.clone(),
                products_price: e.record.price,
                image_url: e.record.image_url.clone(),
            })
            .collect(),
    }
}

fn error_response(err: &ScreenError) -> ApiError {
    let status = match err {
        ScreenError::InvalidPrice(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ScreenError::UnknownEntry(_) => StatusCode::NOT_FOUND,
        ScreenError::Store(_) => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(ApiResponse {
            success: false,
            message: err.to_string(),
        }),
    )
}

// === API Handlers ===

/// Get the screen
#[utoipa::path(
    get,
    path = "/api/v1/catalog",
    tag = "catalog",
    responses(
        (status = 200, description = "Current screen state", body = ScreenResponse)
    )
)]
async fn get_screen(State(state): State<SharedState>) -> Json<ScreenResponse> {
    let screen = state.screen.lock().await;
    Json(screen_response(screen.state()))
}

/// Type into the form
#[utoipa::path(
    patch,
    path = "/api/v1/catalog/form",
    tag = "catalog",
    request_body = UpdateFormRequest,
    responses(
        (status = 200, description = "Form updated", body = ScreenResponse)
    )
)]
async fn update_form(
    State(state): State<SharedState>,
    Json(req): Json<UpdateFormRequest>,
) -> Json<ScreenResponse> {
    let mut screen = state.screen.lock().await;
    let fields = [
        (FormField::Name, req.name),
        (FormField::Type, req.product_type),
        (FormField::Price, req.price),
        (FormField::Image, req.image_url),
    ];
    for (field, value) in fields {
        if let Some(value) = value {
            screen.set_field(field, value);
        }
    }
    Json(screen_response(screen.state()))
}

/// Add or update from the form
#[utoipa::path(
    post,
    path = "/api/v1/catalog/submit",
    tag = "catalog",
    responses(
        (status = 200, description = "Product written", body = SubmitResponse),
        (status = 422, description = "Invalid price", body = ApiResponse),
        (status = 502, description = "Store failure", body = ApiResponse)
    )
)]
async fn submit_form(
    State(state): State<SharedState>,
) -> Result<Json<SubmitResponse>, ApiError> {
    let mut screen = state.screen.lock().await;
    match screen.submit().await {
        Ok(SubmitOutcome::Created(id)) => Ok(Json(SubmitResponse {
            success: true,
            id,
            created: true,
            message: "Product added".to_string(),
        })),
        Ok(SubmitOutcome::Updated(id)) => Ok(Json(SubmitResponse {
            success: true,
            id,
            created: false,
            message: "Product updated".to_string(),
        })),
        Err(e) => Err(error_response(&e)),
    }
}

/// Load a product into the form
#[utoipa::path(
    post,
    path = "/api/v1/catalog/entries/{id}/edit",
    tag = "catalog",
    params(("id" = String, Path, description = "Product ID")),
    responses(
        (status = 200, description = "Editing", body = ScreenResponse),
        (status = 404, description = "Unknown product", body = ApiResponse)
    )
)]
async fn begin_edit(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ScreenResponse>, ApiError> {
    let mut screen = state.screen.lock().await;
    screen.begin_edit(&id).map_err(|e| error_response(&e))?;
    Ok(Json(screen_response(screen.state())))
}

/// Leave edit mode and clear the form
#[utoipa::path(
    post,
    path = "/api/v1/catalog/cancel",
    tag = "catalog",
    responses(
        (status = 200, description = "Form cleared", body = ScreenResponse)
    )
)]
async fn cancel_edit(State(state): State<SharedState>) -> Json<ScreenResponse> {
    let mut screen = state.screen.lock().await;
    screen.cancel_edit();
    Json(screen_response(screen.state()))
}

/// Delete a product; requires `?confirm=true`
#[utoipa::path(
    delete,
    path = "/api/v1/catalog/entries/{id}",
    tag = "catalog",
    params(
        ("id" = String, Path, description = "Product ID"),
        ("confirm" = Option<bool>, Query, description = "Answer to the confirmation dialog")
    ),
    responses(
        (status = 200, description = "Product deleted", body = ApiResponse),
        (status = 409, description = "Confirmation required", body = ConfirmationRequired),
        (status = 502, description = "Store failure", body = ApiResponse)
    )
)]
async fn delete_entry(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Query(query): Query<DeleteQuery>,
) -> axum::response::Response {
    if !query.confirm {
        let prompt = DeletePrompt::new(&id);
        return (
            StatusCode::CONFLICT,
            Json(ConfirmationRequired {
                id: prompt.id,
                title: prompt.title.to_string(),
                message: prompt.message.to_string(),
            }),
        )
            .into_response();
    }

    let mut screen = state.screen.lock().await;
    match screen.delete(&id, &Preconfirmed(true)).await {
        Ok(DeleteOutcome::Deleted) => Json(ApiResponse {
            success: true,
            message: format!("Product {} deleted", id),
        })
        .into_response(),
        Ok(DeleteOutcome::Cancelled) => Json(ApiResponse {
            success: false,
            message: "Delete cancelled".to_string(),
        })
        .into_response(),
        Err(e) => error_response(&e).into_response(),
    }
}

/// Catalog events as SSE frames; ends when the sender is gone
fn event_stream(
    rx: broadcast::Receiver<CatalogEvent>,
) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    let json = serde_json::to_string(&event).unwrap_or_default();
                    return Some((Ok(Event::default().data(json)), rx));
                }
                // Slow client; skip what it missed
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "SSE client lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
}

/// SSE endpoint for catalog events with heartbeat
async fn events(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(event_stream(state.event_tx.subscribe())).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("heartbeat"),
    )
}

async fn serve_openapi() -> impl IntoResponse {
    let doc = ApiDoc::openapi().to_json().unwrap_or_default();
    Response::builder()
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(doc))
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Apply every live snapshot to the shared screen
async fn pump_snapshots(state: SharedState, mut subscription: Subscription) {
    while let Some(item) = subscription.next().await {
        state.screen.lock().await.on_snapshot(item);
    }
    tracing::warn!("Catalog listener stopped");
}

// === Server Entry ===

async fn run_server(
    screen: CatalogScreen,
    event_tx: broadcast::Sender<CatalogEvent>,
    port: u16,
) -> anyhow::Result<()> {
    let subscription = screen.activate().await?;

    let state: SharedState = Arc::new(AppState {
        screen: Mutex::new(screen),
        event_tx,
    });

    tokio::spawn(pump_snapshots(state.clone(), subscription));

    let catalog_routes = Router::new()
        .route("/", get(get_screen))
        .route("/form", patch(update_form))
        .route("/submit", post(submit_form))
        .route("/cancel", post(cancel_edit))
        .route("/entries/:id", delete(delete_entry))
        .route("/entries/:id/edit", post(begin_edit))
        .route("/events", get(events));

    let app = Router::new()
        .nest("/api/v1/catalog", catalog_routes)
        .route("/api/v1/openapi.json", get(serve_openapi))
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    println!("🚀 Catalog Server running at http://{}", addr);
    println!("   Screen:  /api/v1/catalog (GET), /form (PATCH), /submit, /cancel");
    println!("   Entries: /api/v1/catalog/entries/:id (DELETE ?confirm=true), /:id/edit");
    println!("   Events:  /api/v1/catalog/events (SSE)");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("catalog_core=debug,catalog_server=debug,info")
        } else {
            EnvFilter::new("catalog_core=info,catalog_server=info,warn")
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = CatalogConfig::load(args.config.as_deref()).await?;
    if let Some(backend) = args.backend {
        config.backend = backend;
    }

    let store = store::open(&config).await?;
    let (event_tx, _) = broadcast::channel::<CatalogEvent>(100);
    let screen = CatalogScreen::new(store).with_events(event_tx.clone());

    match args.command.unwrap_or(CliCommand::Serve { port: 8080 }) {
        CliCommand::Serve { port } => run_server(screen, event_tx, port).await,
        CliCommand::List => cli::list(screen).await,
        CliCommand::Add {
            name,
            product_type,
            price,
            image,
        } => cli::add(screen, name, product_type, price, image).await,
        CliCommand::Edit {
            id,
            name,
            product_type,
            price,
            image,
        } => cli::edit(screen, &id, name, product_type, price, image).await,
        CliCommand::Delete { id, yes } => cli::delete(screen, &id, yes).await,
        CliCommand::Watch => cli::watch(screen).await,
    }
}
