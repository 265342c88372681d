pub mod api;

use crate::agent::ChatAgent;
use crate::auth::AuthClient;
use crate::cli::Args;
use api::AppState;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    state: AppState,
}

impl Server {
    pub fn new(
        agent: Arc<ChatAgent>,
        auth: Arc<AuthClient>,
        args: Args,
    ) -> Self {
        Self {
            state: AppState {
                agent,
                auth,
                args: Arc::new(args),
            },
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        api::start_http_server(self.state.clone()).await
    }
}
