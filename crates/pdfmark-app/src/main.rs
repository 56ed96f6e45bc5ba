//! Main application entry point.

fn main() {
    env_logger::init();

    if let Err(e) = pdfmark_app::run(std::env::args_os()) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
