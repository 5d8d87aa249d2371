//! Tour Routing - Axum Server

use std::sync::Arc;

use anyhow::Context;
use tour_routing::api::{create_router, AppState};
use tour_routing::config::PlannerConfig;
use tour_routing::console;
use tour_routing::guide::ChatClient;
use tour_routing::mapbox::MapboxClient;
use tour_routing::planner::RoutePlanner;
use tour_routing::routing::RoadGraphProvider;
use tour_routing::sites::{load_boundary_center, SiteCatalog};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tour_routing=info".parse()?))
        .init();

    let config = PlannerConfig::from_env()?;
    console::print_banner();

    let catalog = match &config.sites_path {
        Some(path) => SiteCatalog::load(path)
            .with_context(|| format!("loading tour sites from {}", path.display()))?,
        None => SiteCatalog::builtin()?,
    };
    let center = load_boundary_center(config.boundary_path.as_deref());
    console::print_config(catalog.len(), center, config.road_radius_m);

    let roads = RoadGraphProvider::new(
        config.overpass_url.clone(),
        config.road_cache_dir.clone(),
        config.road_radius_m,
    );
    // Warm the road network cache; a failure here is retried on first use
    match roads.load(center).await {
        Ok(network) => console::print_road_network(
            network.node_count(),
            network.edge_count(),
            network.total_length_km(),
        ),
        Err(e) => warn!("Road network not loaded at startup: {}", e),
    }

    let mapbox = MapboxClient::new(config.mapbox_params())?;
    let guide = config.chat_params().map(ChatClient::new).transpose()?;
    if guide.is_none() {
        info!("OPENAI_API_KEY not set, /guide is disabled");
    }

    let planner = RoutePlanner::new(Arc::new(catalog), roads, center, mapbox)
        .with_concurrent_legs(config.concurrent_legs);
    let app = create_router(Arc::new(AppState::new(planner, guide)));

    println!("Server listening on http://{}", config.bind_addr);
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
