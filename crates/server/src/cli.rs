//! One-shot terminal commands over the catalog screen

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use catalog_core::model::CatalogEntry;
use catalog_core::screen::{
    CatalogScreen, ConfirmDelete, DeleteOutcome, DeletePrompt, FormField, Preconfirmed,
    SubmitOutcome,
};
use catalog_core::store::Subscription;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Asks on the terminal; anything but y/yes cancels
struct StdinConfirm;

#[async_trait]
impl ConfirmDelete for StdinConfirm {
    async fn confirm(&self, prompt: &DeletePrompt) -> bool {
        let mut stdout = tokio::io::stdout();
        let question = format!("{}\n{} [y/N] ", prompt.title, prompt.message);
        if stdout.write_all(question.as_bytes()).await.is_err() {
            return false;
        }
        let _ = stdout.flush().await;

        let mut answer = String::new();
        let mut reader = BufReader::new(tokio::io::stdin());
        match reader.read_line(&mut answer).await {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    }
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn format_entry(entry: &CatalogEntry) -> String {
    let price = entry
        .record
        .price
        .map(|p| format!("${}", p))
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "{:<16} {:<24} {:<16} {}",
        entry.id, entry.record.name, entry.record.product_type, price
    );
    if let Some(image) = &entry.record.image_url {
        line.push_str(&format!("  [{}]", image));
    }
    line
}

fn print_entries(screen: &CatalogScreen) {
    let entries = &screen.state().entries;
    if entries.is_empty() {
        println!("No products.");
        return;
    }
    for entry in entries {
        println!("{}", format_entry(entry));
    }
}

/// Attach the listener and wait for the first full snapshot
async fn load(screen: &mut CatalogScreen) -> Result<Subscription> {
    let mut subscription = screen.activate().await?;
    match subscription.next().await {
        Some(Ok(snapshot)) => screen.apply_snapshot(&snapshot),
        Some(Err(e)) => return Err(e.into()),
        None => return Err(anyhow!("Catalog listener closed before the first snapshot")),
    }
    Ok(subscription)
}

async fn submit(screen: &mut CatalogScreen) -> Result<()> {
    match screen.submit().await? {
        SubmitOutcome::Created(id) => println!("✅ Product added ({})", id),
        SubmitOutcome::Updated(id) => println!("✅ Product updated ({})", id),
    }
    Ok(())
}

pub async fn list(mut screen: CatalogScreen) -> Result<()> {
    load(&mut screen).await?;
    print_entries(&screen);
    Ok(())
}

pub async fn add(
    mut screen: CatalogScreen,
    name: String,
    product_type: String,
    price: String,
    image: Option<String>,
) -> Result<()> {
    load(&mut screen).await?;
    screen.set_field(FormField::Name, name);
    screen.set_field(FormField::Type, product_type);
    screen.set_field(FormField::Price, price);
    if let Some(image) = image {
        screen.set_field(FormField::Image, image);
    }
    submit(&mut screen).await
}

pub async fn edit(
    mut screen: CatalogScreen,
    id: &str,
    name: Option<String>,
    product_type: Option<String>,
    price: Option<String>,
    image: Option<String>,
) -> Result<()> {
    load(&mut screen).await?;
    screen.begin_edit(id)?;

    let fields = [
        (FormField::Name, name),
        (FormField::Type, product_type),
        (FormField::Price, price),
        (FormField::Image, image),
    ];
    for (field, value) in fields {
        if let Some(value) = value {
            screen.set_field(field, value);
        }
    }
    submit(&mut screen).await
}

pub async fn delete(mut screen: CatalogScreen, id: &str, yes: bool) -> Result<()> {
    load(&mut screen).await?;
    if screen.state().entry(id).is_none() {
        return Err(anyhow!("No product with id {}", id));
    }

    let outcome = if yes {
        screen.delete(id, &Preconfirmed(true)).await?
    } else {
        screen.delete(id, &StdinConfirm).await?
    };
    match outcome {
        DeleteOutcome::Deleted => println!("🗑️  Product {} deleted", id),
        DeleteOutcome::Cancelled => println!("Delete cancelled"),
    }
    Ok(())
}

pub async fn watch(mut screen: CatalogScreen) -> Result<()> {
    let mut subscription = screen.activate().await?;
    println!("👀 Watching catalog (Ctrl+C to stop)");

    while let Some(item) = subscription.next().await {
        let failed = item.is_err();
        screen.on_snapshot(item);
        if failed {
            if let Some(notice) = &screen.state().notice {
                eprintln!("⚠️  {}", notice.message);
            }
            continue;
        }
        println!("--- {} product(s)", screen.state().entries.len());
        print_entries(&screen);
    }
    Ok(())
}
