use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};

use fern::colors::{Color, ColoredLevelConfig};

use converse::config::Config;
use converse::models::{NewBoard, NewCategory, SingleConnection};
use converse::Result;

fn setup_logging(config: &Config) -> Result<()> {
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red);

    let mut dispatch = fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "{} [{}] [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message,
            ))
        })
        .level(log::LevelFilter::Debug)
        .chain(std::io::stdout());

    if let Some(ref log_file) = config.log_file {
        dispatch = dispatch.chain(fern::log_file(log_file)?);
    }

    dispatch.apply()?;

    Ok(())
}

fn main_res() -> Result<()> {
    let matches = Command::new("conversectl")
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Administer a converse forum database")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .num_args(1)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Config file to use"),
        )
        .arg(
            Arg::new("database-url")
                .short('u')
                .long("database-url")
                .value_name("URL")
                .num_args(1)
                .help("URL to use to connect to the database"),
        )
        .subcommand(
            Command::new("gen-config")
                .about("Print a config file with default values"),
        )
        .subcommand(
            Command::new("check-config")
                .about("Check configuration file for errors"),
        )
        .subcommand(
            Command::new("recount")
                .about("Recalculate cached board counters from live rows")
                .arg(
                    Arg::new("board")
                        .short('b')
                        .long("board")
                        .value_name("ID")
                        .num_args(1)
                        .value_parser(clap::value_parser!(i32))
                        .help("The board to recount"),
                )
                .arg(
                    Arg::new("all")
                        .short('a')
                        .long("all")
                        .action(ArgAction::SetTrue)
                        .conflicts_with("board")
                        .help("Recount every board"),
                ),
        )
        .subcommand(
            Command::new("add-category")
                .about("Add a new category")
                .arg(
                    Arg::new("name")
                        .short('n')
                        .long("name")
                        .required(true)
                        .num_args(1)
                        .help("The name of the category"),
                )
                .arg(
                    Arg::new("sort-order")
                        .short('s')
                        .long("sort-order")
                        .num_args(1)
                        .default_value("0")
                        .value_parser(clap::value_parser!(i32))
                        .help("Where the category sorts in listings"),
                ),
        )
        .subcommand(
            Command::new("add-board")
                .about("Add a new board")
                .arg(
                    Arg::new("category")
                        .short('g')
                        .long("category")
                        .value_name("ID")
                        .required(true)
                        .num_args(1)
                        .value_parser(clap::value_parser!(i32))
                        .help("The category to list the board under"),
                )
                .arg(
                    Arg::new("name")
                        .short('n')
                        .long("name")
                        .required(true)
                        .num_args(1)
                        .help("The name of the board"),
                )
                .arg(
                    Arg::new("description")
                        .short('d')
                        .long("description")
                        .num_args(1)
                        .default_value("")
                        .help("The description of the board"),
                )
                .arg(
                    Arg::new("sort-order")
                        .short('s')
                        .long("sort-order")
                        .num_args(1)
                        .default_value("0")
                        .value_parser(clap::value_parser!(i32))
                        .help("Where the board sorts within its category"),
                ),
        )
        .subcommand(
            Command::new("list-boards")
                .about("List all boards and their cached counters")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the boards as JSON"),
                ),
        )
        .get_matches();

    if matches.subcommand_matches("gen-config").is_some() {
        Config::generate(std::io::stdout())?;
        return Ok(());
    }

    let conf_path = matches
        .get_one::<PathBuf>("config")
        .cloned()
        .unwrap_or_else(Config::default_path);

    let mut config = Config::open(&conf_path)?;

    if let Some(url) = matches.get_one::<String>("database-url") {
        config.database_url = url.to_owned();
    }

    if matches.subcommand_matches("check-config").is_some() {
        // Opening the config already parsed it, so we know it's good.
        println!("Configuration: {}", conf_path.display());
        println!("\nConfig file is good.");
        return Ok(());
    }

    setup_logging(&config)?;
    config.debug_log();

    let mut db = SingleConnection::establish(&config.database_url)?;

    if let Some(matches) = matches.subcommand_matches("recount") {
        if matches.get_flag("all") {
            for board in db.all_boards()? {
                db.recompute_board(board.id)?;
                println!("recounted board {} ({})", board.id, board.name);
            }
        } else if let Some(&board_id) = matches.get_one::<i32>("board") {
            db.recompute_board(board_id)?;
            println!("recounted board {}", board_id);
        } else {
            eprintln!("recount needs either --board or --all");
        }
    }

    if let Some(matches) = matches.subcommand_matches("add-category") {
        let new_id = db.insert_category(NewCategory {
            name: matches.get_one::<String>("name").unwrap().to_owned(),
            sort_order: *matches.get_one::<i32>("sort-order").unwrap(),
        })?;

        println!("added category {}", new_id);
    }

    if let Some(matches) = matches.subcommand_matches("add-board") {
        let new_id = db.insert_board(NewBoard {
            category_id: *matches.get_one::<i32>("category").unwrap(),
            name: matches.get_one::<String>("name").unwrap().to_owned(),
            description: matches
                .get_one::<String>("description")
                .unwrap()
                .to_owned(),
            sort_order: *matches.get_one::<i32>("sort-order").unwrap(),
        })?;

        println!("added board {}", new_id);
    }

    if let Some(matches) = matches.subcommand_matches("list-boards") {
        let boards = db.all_boards()?;

        if matches.get_flag("json") {
            println!("{}", serde_json::to_string_pretty(&boards)?);
        } else {
            for board in boards {
                println!(
                    "{:4}  {:24}  threads {:6}  posts {:6}  last post {}",
                    board.id,
                    board.name,
                    board.thread_count,
                    board.post_count,
                    board
                        .last_post_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "-".into()),
                );
            }
        }
    }

    Ok(())
}

fn main() {
    if let Err(e) = main_res() {
        eprintln!("{}", e);
        std::process::exit(-1);
    }
}
