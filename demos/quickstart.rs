//! Minimal end-to-end example for `ordinal-harness`.
//!
//! Ranks five snack ideas by "how much would you buy this". A front-end task
//! plays the human: it answers each question the driver sends over a
//! [`ChannelOracle`], preferring a hidden order but getting one in six wrong.
//!
//! To run:
//! - `cargo run --example quickstart`

use std::sync::Arc;

use ordinal_harness::{ChannelOracle, EngineConfig, ItemId, SessionController};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let snacks: Vec<ItemId> = ["pretzels", "dates", "popcorn", "nori", "granola"]
        .into_iter()
        .map(ItemId::from)
        .collect();

    // The "human": prefers items earlier in this list.
    let taste = ["popcorn", "nori", "dates", "pretzels", "granola"];

    // -- Engine configuration ------------------------------------------------

    let mut config = EngineConfig::default().with_seed(7);
    config.driver.max_comparisons = Some(20); // stop after 20 answers
    config.driver.target_confidence = Some(0.6); // or earlier once this sure

    let (oracle, mut questions) = ChannelOracle::new(1);
    let mut controller = SessionController::new(Arc::new(oracle), config)?;

    // -- Front-end loop --------------------------------------------------------

    let front_end = tokio::spawn(async move {
        let mut asked = 0usize;
        while let Some(question) = questions.recv().await {
            asked += 1;
            let pos = |id: &ItemId| taste.iter().position(|t| *t == id.as_str());
            let mut winner = if pos(&question.a) <= pos(&question.b) {
                question.a.clone()
            } else {
                question.b.clone()
            };
            if asked % 6 == 0 {
                // An occasional inconsistent answer.
                winner = if winner == question.a {
                    question.b.clone()
                } else {
                    question.a.clone()
                };
            }
            println!("Q{asked}: {} or {}? -> {winner}", question.a, question.b);
            question.pick(winner);
        }
        asked
    });

    // -- Run until a stop condition holds ------------------------------------

    controller.start(snacks)?;
    controller.wait_for_driver().await;
    let ranking = controller.stop().await?;
    drop(controller);
    let asked = front_end.await?;

    println!("\nAsked {asked} questions.\n");
    for entry in &ranking.entries {
        println!(
            "{:>2}. {:<10} strength {:>6.2}  uncertainty {:.2}",
            entry.rank,
            entry.item.as_str(),
            entry.strength.value_or_neutral(),
            entry.normalized_uncertainty,
        );
    }
    println!("\naggregate confidence: {:.2}", ranking.aggregate_confidence);

    Ok(())
}
