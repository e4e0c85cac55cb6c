use outrank::{cli, logging};

fn main() {
    logging::init();
    std::process::exit(cli::run());
}
