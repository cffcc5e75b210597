use clap::Parser;
use minesweeper::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Autonomous Minesweeper bot: logically safe moves first, random guesses otherwise.
#[derive(Parser, Debug)]
#[command(name = "minesweeper-bot", version)]
struct BotArgs {
    /// Board height
    #[arg(long, default_value_t = 8)]
    height: usize,

    /// Board width
    #[arg(long, default_value_t = 8)]
    width: usize,

    /// Number of mines
    #[arg(long, default_value_t = 8)]
    mines: usize,

    /// Seed for mine placement and guesses; random when omitted
    #[arg(long)]
    seed: Option<u64>,

    /// Number of games to play
    #[arg(long, default_value_t = 1)]
    games: usize,

    /// Stop instead of guessing when no safe move is known
    #[arg(long)]
    no_guess: bool,

    /// Cross-check every deduction with the SAT oracle
    #[arg(long)]
    audit: bool,

    /// Print the board and what the bot knows after each game
    #[arg(long)]
    show_board: bool,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = BotArgs::parse();
    let seed = args.seed.unwrap_or_else(|| rand::rng().random());
    let mut rng = StdRng::seed_from_u64(seed);
    let options = PlayOptions {
        allow_guess: !args.no_guess,
        audit: args.audit,
    };

    info!(
        seed,
        height = args.height,
        width = args.width,
        mines = args.mines,
        games = args.games,
        "starting"
    );

    let mut won = 0;
    let mut lost = 0;
    let mut stuck = 0;

    for game in 1..=args.games {
        let board = Board::new(args.height, args.width, args.mines, &mut rng)?;
        let mut engine = KnowledgeEngine::new(args.height, args.width)?;
        let report = play(&board, &mut engine, &mut rng, &options)?;

        match report.outcome {
            Outcome::Won => won += 1,
            Outcome::Lost => lost += 1,
            Outcome::Stuck => stuck += 1,
        }

        println!(
            "game {game}: {:?} ({} safe moves, {} guesses, {}/{} mines flagged)",
            report.outcome,
            report.safe_moves,
            report.random_moves,
            report.mines_found,
            board.mines().len()
        );
        if args.show_board {
            print!("{}", board.render());
            print_knowledge(&board, &engine, report.losing_cell)?;
        }
    }

    println!("won {won}, lost {lost}, stuck {stuck} (seed {seed})");
    Ok(())
}

fn print_knowledge(board: &Board, engine: &KnowledgeEngine, boom: Option<Cell>) -> anyhow::Result<()> {
    print!("   ");
    for col in 0..engine.width() {
        print!("{:^3}", col);
    }
    println!("\n  +{}", "---".repeat(engine.width()));

    for row in 0..engine.height() {
        print!("{:^2}|", row);
        for col in 0..engine.width() {
            let cell = Cell::new(row, col);
            let display = if boom == Some(cell) {
                " * ".to_string()
            } else if engine.confirmed_mines().contains(&cell) {
                " F ".to_string()
            } else if engine.moves_made().contains(&cell) {
                format!(" {} ", board.nearby_mines(cell)?)
            } else if engine.confirmed_safes().contains(&cell) {
                " . ".to_string()
            } else {
                " ■ ".to_string()
            };
            print!("{}", display);
        }
        println!();
    }
    println!();
    Ok(())
}
