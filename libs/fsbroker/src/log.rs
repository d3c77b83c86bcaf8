use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncBufReadExt, BufReader, Lines};

// ════════════════════════════════════════════════════════════════
//  TopicLog
// ════════════════════════════════════════════════════════════════

/// Append-only лог топиков: один обычный файл на topic под data_dir.
///
/// Файл — конкатенация всех опубликованных фреймов, каждый завершён
/// одним `\n`. Broker никогда не переписывает и не усекает файлы.
pub struct TopicLog {
    data_dir: PathBuf,
}

impl TopicLog {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Создать data-директорию рекурсивно. Идемпотентно.
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.data_dir).await
    }

    /// Путь к файлу topic'а. Имя файла равно имени topic'а verbatim —
    /// имена с path-разделителями отклоняются на handshake.
    fn topic_path(&self, topic: &str) -> PathBuf {
        self.data_dir.join(topic)
    }

    /// Открыть файл topic'а для append (create-if-missing).
    /// Handle принадлежит producer-сессии до её конца.
    pub async fn open_append(&self, topic: &str) -> std::io::Result<File> {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.topic_path(topic))
            .await
    }

    /// Итерация line-delimited фреймов в порядке файла (create-if-missing:
    /// consumer, подключившийся к новому topic'у, создаёт пустой файл).
    pub async fn scan(&self, topic: &str) -> std::io::Result<Lines<BufReader<File>>> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(self.topic_path(topic))
            .await?;
        Ok(BufReader::new(file).lines())
    }
}
