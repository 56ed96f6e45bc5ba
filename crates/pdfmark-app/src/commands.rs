//! Subcommand implementations.

use anyhow::{Context as _, Result};
use pdfmark_core::{FileStorage, Highlight, HighlightRepository, OwnerKey, SyncQueue};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

/// Longest text excerpt shown in tables.
const EXCERPT_CHARS: usize = 40;

pub struct Context {
    repository: HighlightRepository<FileStorage>,
    queue: SyncQueue<FileStorage>,
}

fn excerpt(text: &str) -> String {
    let text = text.trim();
    if text.chars().count() <= EXCERPT_CHARS {
        return text.to_string();
    }
    let mut short: String = text.chars().take(EXCERPT_CHARS - 1).collect();
    short.push('…');
    short
}

fn print_highlights(out: &mut impl Write, highlights: &[Highlight], json: bool) -> Result<()> {
    if json {
        writeln!(out, "{}", serde_json::to_string_pretty(highlights)?)?;
        return Ok(());
    }
    for h in highlights {
        writeln!(
            out,
            "{}  p{:<4} {:<5} {:<7} {:<8} {}",
            h.id,
            h.page,
            h.kind(),
            h.color,
            if h.synced { "synced" } else { "local" },
            excerpt(&h.text)
        )?;
    }
    writeln!(out, "{} highlight(s)", highlights.len())?;
    Ok(())
}

impl Context {
    pub fn new(storage: FileStorage) -> Self {
        let storage = Arc::new(storage);
        Self {
            repository: HighlightRepository::new(storage.clone()),
            queue: SyncQueue::new(storage),
        }
    }

    pub async fn list(&self, out: &mut impl Write, owner: &OwnerKey, page: Option<u32>, json: bool) -> Result<()> {
        let highlights = match page {
            Some(page) => self.repository.list_by_page(owner, page).await?,
            None => self.repository.list_by_owner(owner).await?,
        };
        print_highlights(out, &highlights, json)
    }

    pub async fn remove(&self, out: &mut impl Write, id: &str) -> Result<()> {
        let Some(existing) = self.repository.get(id).await? else {
            anyhow::bail!("no highlight with id {id}");
        };
        self.repository.remove(id).await?;
        writeln!(out, "removed {id}")?;

        // The CLI has no remote connection; synced copies are deleted on the next drain.
        match existing.remote_id.as_deref() {
            Some(remote_id) => {
                let item = self.queue.enqueue_delete(remote_id, "removed offline").await?;
                writeln!(out, "queued remote delete of {remote_id} as #{item}")?;
            }
            None => {
                let cancelled = self.queue.cancel_saves_for(id).await?;
                if cancelled > 0 {
                    writeln!(out, "cancelled {cancelled} pending save(s)")?;
                }
            }
        }
        Ok(())
    }

    pub async fn dedupe(&self, out: &mut impl Write, owner: &OwnerKey, page: Option<u32>) -> Result<()> {
        let removed = match page {
            Some(page) => self.repository.dedupe_page(owner, page).await?,
            None => self.repository.dedupe_owner(owner).await?,
        };
        for id in &removed {
            writeln!(out, "removed {id}")?;
        }
        writeln!(out, "{} duplicate(s) removed", removed.len())?;
        Ok(())
    }

    pub async fn import(&self, out: &mut impl Write, pdf: &Path, owner: &OwnerKey) -> Result<()> {
        let bytes = fs::read(pdf).with_context(|| format!("failed to read {}", pdf.display()))?;
        let report = pdfmark_pdf::import_highlights(&bytes, owner)
            .with_context(|| format!("failed to parse {}", pdf.display()))?;

        let mut added = 0;
        let mut duplicates = 0;
        for mut highlight in report.highlights {
            // The same annotation names may already be stored under another owner.
            if let Some(existing) = self.repository.get(&highlight.id).await? {
                if existing.owner != *owner {
                    highlight = highlight.with_new_id();
                }
            }
            match self.repository.add(highlight).await? {
                Some(_) => added += 1,
                None => duplicates += 1,
            }
        }
        writeln!(
            out,
            "imported {added}, {duplicates} duplicate(s), {} unreadable, {} other annotation(s)",
            report.skipped, report.ignored
        )?;
        Ok(())
    }

    pub async fn export(&self, out: &mut impl Write, pdf: &Path, output: &Path, owner: &OwnerKey) -> Result<()> {
        let bytes = fs::read(pdf).with_context(|| format!("failed to read {}", pdf.display()))?;
        let highlights = self.repository.list_by_owner(owner).await?;

        let (exported, report) = pdfmark_pdf::export_with_report(&bytes, &highlights)
            .with_context(|| format!("failed to export into {}", pdf.display()))?;
        fs::write(output, exported).with_context(|| format!("failed to write {}", output.display()))?;

        writeln!(
            out,
            "wrote {} new, {} replaced, {} skipped to {}",
            report.written,
            report.replaced,
            report.skipped,
            output.display()
        )?;
        Ok(())
    }

    pub async fn queue(&self, out: &mut impl Write, json: bool) -> Result<()> {
        let items = self.queue.pending().await?;
        if json {
            writeln!(out, "{}", serde_json::to_string_pretty(&items)?)?;
            return Ok(());
        }
        for item in &items {
            let target = item
                .local_id
                .as_deref()
                .or(item.target_id.as_deref())
                .unwrap_or("-");
            writeln!(
                out,
                "#{:<4} {:<6} {}  retries={} {}  {}",
                item.id,
                format!("{:?}", item.action).to_lowercase(),
                target,
                item.retry_count,
                item.timestamp.format("%Y-%m-%d %H:%M:%S"),
                item.last_error.as_deref().unwrap_or("")
            )?;
        }
        writeln!(out, "{} pending", items.len())?;
        Ok(())
    }

    pub async fn queue_clear(&self, out: &mut impl Write, id: Option<u64>) -> Result<()> {
        match id {
            Some(id) => {
                self.queue.clear(id).await?;
                writeln!(out, "cleared #{id}")?;
            }
            None => {
                let count = self.queue.clear_all().await?;
                writeln!(out, "cleared {count} item(s)")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{Document, Object, dictionary};
    use pdfmark_core::{HighlightColor, SyncQueueItem};
    use pdfmark_core::storage::QueueStore;
    use pollster::block_on;
    use std::path::PathBuf;
    use tempfile::{TempDir, tempdir};

    fn owner() -> OwnerKey {
        OwnerKey::Remote("doc".to_string())
    }

    fn context(dir: &TempDir) -> Context {
        Context::new(FileStorage::new(dir.path().join("store")).unwrap())
    }

    fn blank_pdf(dir: &TempDir) -> PathBuf {
        let mut doc = Document::with_version("1.7");
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        let pages_id = doc.add_object(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::Reference(page_id)],
            "Count" => 1,
        });
        if let Ok(dict) = doc.get_dictionary_mut(page_id) {
            dict.set("Parent", Object::Reference(pages_id));
        }
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => Object::Reference(pages_id),
        });
        doc.trailer.set("Root", Object::Reference(catalog_id));

        let path = dir.path().join("blank.pdf");
        doc.save(&path).unwrap();
        path
    }

    fn seed(ctx: &Context, x: f64) -> Highlight {
        let h = Highlight::area(
            owner(),
            1,
            kurbo::Rect::new(x, 10.0, x + 40.0, 50.0),
            kurbo::Size::new(612.0, 792.0),
            HighlightColor::Green,
        );
        block_on(ctx.repository.add(h)).unwrap().unwrap()
    }

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_export_then_import_elsewhere() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        seed(&ctx, 10.0);
        seed(&ctx, 100.0);

        let pdf = blank_pdf(&dir);
        let exported = dir.path().join("out.pdf");
        let mut out = Vec::new();
        block_on(ctx.export(&mut out, &pdf, &exported, &owner())).unwrap();
        assert!(output(out).contains("wrote 2 new"));

        let other = OwnerKey::Local("copy".to_string());
        let mut out = Vec::new();
        block_on(ctx.import(&mut out, &exported, &other)).unwrap();
        assert!(output(out).starts_with("imported 2, 0 duplicate(s)"));

        // Importing the same file again only finds duplicates.
        let mut out = Vec::new();
        block_on(ctx.import(&mut out, &exported, &other)).unwrap();
        assert!(output(out).starts_with("imported 0, 2 duplicate(s)"));
    }

    #[test]
    fn test_list_json() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        let h = seed(&ctx, 10.0);

        let mut out = Vec::new();
        block_on(ctx.list(&mut out, &owner(), Some(1), true)).unwrap();
        let listed: Vec<Highlight> = serde_json::from_slice(&out).unwrap();
        assert_eq!(listed, vec![h]);
    }

    #[test]
    fn test_remove_unknown_fails() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        assert!(block_on(ctx.remove(&mut Vec::new(), "missing")).is_err());

        let h = seed(&ctx, 10.0);
        block_on(ctx.remove(&mut Vec::new(), &h.id)).unwrap();
        assert!(block_on(ctx.repository.get(&h.id)).unwrap().is_none());
    }

    #[test]
    fn test_remove_synced_queues_remote_delete() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        let h = seed(&ctx, 10.0);
        block_on(ctx.repository.mark_synced(&h.id, "r1")).unwrap();

        let mut out = Vec::new();
        block_on(ctx.remove(&mut out, &h.id)).unwrap();
        assert!(output(out).contains("queued remote delete of r1"));

        let pending = block_on(ctx.queue.pending()).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].target_id.as_deref(), Some("r1"));
    }

    #[test]
    fn test_dedupe_reports_removed() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        let h = seed(&ctx, 10.0);
        // Write a duplicate straight to the store, as an older client would have.
        let copy = Highlight {
            id: "older-copy".to_string(),
            created_at: h.created_at - chrono::Duration::seconds(10),
            ..h.clone()
        };
        block_on(pdfmark_core::HighlightStore::put(ctx.repository.store().as_ref(), &copy)).unwrap();

        let mut out = Vec::new();
        block_on(ctx.dedupe(&mut out, &owner(), None)).unwrap();
        let text = output(out);
        assert!(text.contains("removed older-copy"));
        assert!(text.contains("1 duplicate(s) removed"));
    }

    #[test]
    fn test_queue_list_and_clear() {
        let dir = tempdir().unwrap();
        let ctx = context(&dir);
        let store = ctx.repository.store().clone();
        let first = block_on(store.push(SyncQueueItem::delete("r1", "offline"))).unwrap();
        block_on(store.push(SyncQueueItem::delete("r2", "timed out"))).unwrap();

        let mut out = Vec::new();
        block_on(ctx.queue(&mut out, false)).unwrap();
        let text = output(out);
        assert!(text.contains("r1"));
        assert!(text.contains("2 pending"));

        block_on(ctx.queue_clear(&mut Vec::new(), Some(first))).unwrap();
        assert_eq!(block_on(ctx.queue.pending_count()).unwrap(), 1);

        block_on(ctx.queue_clear(&mut Vec::new(), None)).unwrap();
        assert_eq!(block_on(ctx.queue.pending_count()).unwrap(), 0);
    }
}
