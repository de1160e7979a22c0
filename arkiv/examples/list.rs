use std::env;

use arkiv::{auth::Authenticator, Client};

#[tokio::main]
async fn main() -> Result<(), arkiv::Error> {
    tracing_subscriber::fmt::init();

    let url = env::var("ARKIV_URL").unwrap().parse().unwrap();
    let username = env::var("ARKIV_USERNAME").unwrap();
    let password = env::var("ARKIV_PASSWORD").unwrap();

    let auth = Authenticator::new(url);
    auth.login(&username, &password, None).await?;

    let client = Client::new(auth);
    let usage = client.disk_usage().await?;

    println!("{}/{} bytes used", usage.used, usage.allowed);

    for folder in client.folders().await?.flatten() {
        println!("{}", folder.path);

        for file in &folder.files {
            println!("  {} ({} bytes)", file.name, file.size);
        }
    }

    Ok(())
}
