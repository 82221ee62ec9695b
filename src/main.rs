use log::error;

use storefront_chat::app::{self, AppState};
use storefront_chat::utils::RUNTIME;

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let state = AppState::load();
    if let Err(e) = RUNTIME.block_on(app::run(state)) {
        error!("{}", e);
        std::process::exit(1);
    }
}
