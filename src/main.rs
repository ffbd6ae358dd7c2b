fn main() {
    if let Err(e) = medminder_lib::run() {
        tracing::error!(error = %e, "Medminder exited with an error");
        eprintln!("medminder: {e}");
        std::process::exit(1);
    }
}
