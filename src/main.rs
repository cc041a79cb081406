use dotenvy::dotenv;
use tracing::info;

use ideaforge::infra::{
    app::create_app,
    maintenance::run_maintenance_loop,
    setup::{init_app_state, init_tracing},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let (app_state, maintenance) = init_app_state().await?;

    let bind_addr = app_state.config.bind_addr;
    let maintenance_interval = app_state.config.maintenance_interval_secs;

    let app = create_app(app_state);

    tokio::spawn(async move {
        run_maintenance_loop(maintenance, maintenance_interval).await;
    });

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;

    info!("Billing API listening at {}", &listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
