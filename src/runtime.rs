//! Bridges the few collaborators that only speak async (the `kube` client,
//! the AWS ECR SDK) into the otherwise synchronous call graph used
//! everywhere else in this crate.

use std::future::Future;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use tokio::runtime::{Builder, Runtime};

static TOKIO_RUNTIME: Lazy<Mutex<Runtime>> = Lazy::new(|| {
    Mutex::new(
        Builder::new_current_thread()
            .thread_name("privateer-blocking")
            .enable_all()
            .build()
            .expect("failed to build blocking tokio runtime"),
    )
});

pub fn block_on<F: Future>(future: F) -> F::Output {
    TOKIO_RUNTIME.lock().unwrap().block_on(future)
}
