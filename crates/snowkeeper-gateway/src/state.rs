use std::sync::Arc;

use snowkeeper_flake::IdGenerator;

#[derive(Clone)]
pub struct AppState {
    generator: Arc<dyn IdGenerator>,
}

impl AppState {
    pub fn new(generator: Arc<dyn IdGenerator>) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> Arc<dyn IdGenerator> {
        Arc::clone(&self.generator)
    }
}
