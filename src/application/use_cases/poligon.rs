use std::sync::Arc;

use tracing::info;

use crate::domain::error::Result;
use crate::domain::hub::SubmitTarget;
use crate::infrastructure::hub::HubClient;

pub struct PoligonUseCase {
    hub: Arc<HubClient>,
}

impl PoligonUseCase {
    pub fn new(hub: Arc<HubClient>) -> Self {
        Self { hub }
    }

    pub async fn execute(&self) -> Result<()> {
        let url = self.hub.poligon_file_url("dane.txt")?;
        let text = self.hub.fetch_text(&url).await?;
        let lines = non_empty_lines(&text);
        info!(lines = ?lines, "Poligon data");

        self.hub
            .submit("POLIGON", &lines, SubmitTarget::Poligon)
            .await?;
        Ok(())
    }
}

fn non_empty_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.is_empty())
        .map(|line| line.to_string())
        .collect()
}
