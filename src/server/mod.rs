pub mod api;
pub mod error;

use crate::cli::Args;
use api::AppState;
use axum_server::tls_rustls::RustlsConfig;
use log::info;
use std::error::Error;
use std::net::SocketAddr;

pub struct Server {
    addr: String,
    state: AppState,
    args: Args,
}

impl Server {
    pub fn new(addr: String, state: AppState, args: Args) -> Self {
        Self { addr, state, args }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let app = api::router(self.state.clone(), self.args.static_dir.as_deref());

        if self.args.enable_tls {
            let (cert_path, key_path) = match (&self.args.tls_cert_path, &self.args.tls_key_path) {
                (Some(cert), Some(key)) => (cert, key),
                _ => {
                    return Err("TLS enabled but --tls-cert-path or --tls-key-path is missing".into());
                }
            };
            let tls = RustlsConfig::from_pem_file(cert_path, key_path).await.map_err(|e|
                format!("Failed to load TLS certificate or key: {}", e)
            )?;
            let addr: SocketAddr = self.addr.parse()?;

            info!("Chat relay listening on https://{}", addr);
            axum_server::bind_rustls(addr, tls).serve(app.into_make_service()).await?;
        } else {
            let listener = tokio::net::TcpListener::bind(&self.addr).await?;

            info!("Chat relay listening on http://{}", listener.local_addr()?);
            axum::serve(listener, app).await?;
        }

        Ok(())
    }
}
