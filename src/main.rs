use env_logger::Env;
use visamock_lib::InterviewError;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let profile_path = args.next().unwrap_or_else(|| "i20_details.json".to_string());
    let Some(user_key) = args.next() else {
        eprintln!("Usage: visamock <profile.json> <email>");
        std::process::exit(2);
    };

    println!("\n=== VisaMock F1 Interview ===");
    if let Err(e) = visamock_lib::run(&profile_path, &user_key).await {
        if let Some(err @ InterviewError::ProfileMissing(_)) = e.downcast_ref::<InterviewError>() {
            eprintln!("{}", err.status_message());
            std::process::exit(2);
        }
        eprintln!("Error running interview: {:#}", e);
        std::process::exit(1);
    }
}
