use anyhow::Result;
use xsd_diagnostics::lsp::server::serve;

#[tokio::main]
async fn main() -> Result<()> {
    serve().await
}
