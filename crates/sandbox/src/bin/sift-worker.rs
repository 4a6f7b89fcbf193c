//! Isolated script worker: one JSON request on stdin, one JSON response on
//! stdout. Started by the supervisor, never by hand.

fn main() -> std::process::ExitCode {
    sift_sandbox::worker::main()
}
