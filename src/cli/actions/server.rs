use crate::cli::{actions::Action, globals::GlobalArgs};
use crate::portier;
use anyhow::Result;
use url::Url;

/// Handle the server action
pub async fn handle(action: Action) -> Result<()> {
    match action {
        Action::Server { port, api_url } => {
            // Refuse to start without a usable backend address
            let api_url = Url::parse(&api_url)?;

            let globals = GlobalArgs::new(api_url);

            portier::new(port, globals).await?;
        }
    }

    Ok(())
}
