use std::sync::Arc;

use anyhow::{Result, bail};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::backends::Warehouse;

/// 📓 A warehouse that stores nothing and remembers everything.
///
/// Every statement is written down before it's judged, so a test can see exactly what
/// was attempted, including the statement that blew up. `with_failure_on` makes any
/// statement containing the pattern fail.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemoryWarehouse {
    statements: Arc<Mutex<Vec<String>>>,
    failing_pattern: Option<String>,
}

impl InMemoryWarehouse {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_failure_on(mut self, pattern: &str) -> Self {
        self.failing_pattern = Some(pattern.to_string());
        self
    }

    pub(crate) async fn statements(&self) -> Vec<String> {
        self.statements.lock().await.clone()
    }
}

#[async_trait]
impl Warehouse for InMemoryWarehouse {
    async fn execute(&mut self, sql: &str) -> Result<()> {
        self.statements.lock().await.push(sql.to_string());
        if let Some(pattern) = &self.failing_pattern {
            if sql.contains(pattern.as_str()) {
                bail!("💀 in-memory warehouse refused a statement matching '{pattern}'");
            }
        }
        Ok(())
    }
}
