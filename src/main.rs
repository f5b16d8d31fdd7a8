// dungeon/src/main.rs

use dungeon::DungeonError;

fn main() {
    match dungeon::app::run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            // clap renders its own help, version and usage errors.
            if let Some(DungeonError::Usage(usage)) = err.downcast_ref::<DungeonError>() {
                usage.exit();
            }
            eprintln!("ERROR: {err:#}");
            std::process::exit(1);
        }
    }
}
