use std::error::Error;

use clap::{Parser, Subcommand};
use common::games::SessionRng;
use common::games::tictactoe::{Board, BotInput, Difficulty, Mark, calculate_move};
use common::id_generator::generate_player_name;
use common::{GameType, PlayerId, log, logger};
use mini_games_client::config::{Config, get_config_manager};
use mini_games_client::session::{GameOutcome, LocalGameSession, LocalMode, MoveResult};
use mini_games_client::stats::{LeaderboardLoader, LeaderboardResult, MemoryStats};
use tokio::io::{AsyncBufReadExt, BufReader};

#[derive(Parser)]
#[command(name = "mini_games_client")]
struct Args {
    #[arg(long)]
    use_log_prefix: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Play tic-tac-toe against the engine in the terminal
    Play {
        #[arg(long)]
        difficulty: Option<Difficulty>,
        #[arg(long)]
        ai_first: bool,
    },
    /// Let the engine play against itself and print the tally
    Selfplay {
        #[arg(long, default_value_t = 100)]
        games: u32,
        #[arg(long, default_value_t = Difficulty::Impossible)]
        difficulty: Difficulty,
    },
}

fn load_player_id(config: &mut Config, save: impl FnOnce(&Config) -> Result<(), String>) -> PlayerId {
    if let Some(id) = &config.player_id {
        return PlayerId::new(id.clone());
    }
    let id = generate_player_name();
    config.player_id = Some(id.clone());
    if let Err(e) = save(config) {
        log!("Failed to save config: {}", e);
    }
    PlayerId::new(id)
}

async fn play(config: &Config, player_id: PlayerId, difficulty: Difficulty, ai_first: bool) -> Result<(), Box<dyn Error>> {
    let ai_mark = if ai_first { Mark::X } else { Mark::O };
    let stats = MemoryStats::new();
    let mut session = LocalGameSession::new(
        player_id.clone(),
        LocalMode::VersusAi { difficulty, ai_mark },
        config.ai.clone(),
        stats.clone(),
        SessionRng::from_random(),
    );
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    println!("{} vs {} AI. Cells are numbered 0-8, row by row.", player_id, difficulty);
    loop {
        if session.is_ai_turn() {
            session.run_ai_turn().await;
        }
        println!("\n{}\n", session.board());

        if let Some(outcome) = session.outcome() {
            match outcome {
                GameOutcome::Won(line) if line.winner == ai_mark => println!("The AI wins on {:?}.", line.line),
                GameOutcome::Won(line) => println!("You win on {:?}!", line.line),
                GameOutcome::Draw => println!("Draw."),
            }
            println!("Play again? (y/n)");
            match lines.next_line().await? {
                Some(answer) if answer.trim().eq_ignore_ascii_case("y") => {
                    session.restart();
                    continue;
                }
                _ => break,
            }
        }

        println!("Your move:");
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let Ok(index) = line.trim().parse::<usize>() else {
            println!("Enter a cell number from 0 to 8.");
            continue;
        };
        if session.place_mark(index) == MoveResult::Ignored {
            println!("Cell {} is not available.", index);
        }
    }

    let loader = LeaderboardLoader::new(stats, &config.stats);
    if let LeaderboardResult::Loaded(entries) = loader.load(&GameType::tictactoe()).await {
        for entry in entries {
            println!("{}: {} wins in {} games", entry.player_id, entry.wins, entry.games);
        }
    }
    Ok(())
}

fn selfplay(games: u32, difficulty: Difficulty) {
    let mut rng = SessionRng::from_random();
    let (mut x_wins, mut o_wins, mut draws) = (0, 0, 0);

    for _ in 0..games {
        let mut board = Board::new();
        let mut to_move = Mark::X;
        while !board.is_game_over() {
            let next = calculate_move(difficulty, &BotInput::new(board, to_move), &mut rng)
                .and_then(|index| board.make_move(index, to_move));
            match next {
                Ok(next) => board = next,
                Err(e) => {
                    log!("Self-play stopped: {}", e);
                    return;
                }
            }
            to_move = to_move.opponent().unwrap_or(Mark::X);
        }
        match board.winner().map(|result| result.winner) {
            Some(Mark::X) => x_wins += 1,
            Some(_) => o_wins += 1,
            None => draws += 1,
        }
    }

    log!(
        "{} games at {} (seed {}): X {} / O {} / draw {}",
        games,
        difficulty,
        rng.seed(),
        x_wins,
        o_wins,
        draws
    );
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let prefix = if args.use_log_prefix {
        Some("Client".to_string())
    } else {
        None
    };
    logger::init_logger(prefix);

    let config_manager = get_config_manager();
    let mut config = config_manager.get_config()?;
    let player_id = load_player_id(&mut config, |c| config_manager.set_config(c));

    match args.command {
        Command::Play { difficulty, ai_first } => {
            let difficulty = difficulty.unwrap_or(config.ai.default_difficulty);
            play(&config, player_id, difficulty, ai_first).await?;
        }
        Command::Selfplay { games, difficulty } => selfplay(games, difficulty),
    }

    Ok(())
}
