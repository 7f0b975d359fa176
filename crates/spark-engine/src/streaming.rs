use std::str::SplitWhitespace;
use std::thread;
use std::time::Duration;

pub const DEFAULT_CHUNK_DELAY: Duration = Duration::from_millis(40);

/// Prompt words that switch rendering to a single preformatted block.
pub const CODE_KEYWORDS: &[&str] = &["code", "python", "html", "css"];

/// Waits between streamed chunks.
pub trait Pacer {
    fn pause(&mut self, interval: Duration);
}

impl<P: Pacer + ?Sized> Pacer for &mut P {
    fn pause(&mut self, interval: Duration) {
        (**self).pause(interval);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SleepPacer;

impl Pacer for SleepPacer {
    fn pause(&mut self, interval: Duration) {
        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacer;

impl Pacer for NoPacer {
    fn pause(&mut self, _interval: Duration) {}
}

/// Word-by-word replay of a finished response. Each chunk is one word plus a
/// trailing space; the pacer runs between chunks. Once drained it stays
/// drained.
#[derive(Debug)]
pub struct WordStream<'a, P> {
    words: SplitWhitespace<'a>,
    pacer: P,
    delay: Duration,
    emitted: usize,
}

impl<P> WordStream<'_, P> {
    pub fn emitted(&self) -> usize {
        self.emitted
    }
}

impl<P: Pacer> Iterator for WordStream<'_, P> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let word = self.words.next()?;
        if self.emitted > 0 {
            self.pacer.pause(self.delay);
        }
        self.emitted += 1;
        Some(format!("{word} "))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    Stream,
    Block,
}

impl RenderMode {
    /// Matched against the prompt, not the response.
    pub fn for_prompt(prompt: &str) -> Self {
        let lowered = prompt.to_lowercase();
        if CODE_KEYWORDS
            .iter()
            .any(|keyword| lowered.contains(keyword))
        {
            Self::Block
        } else {
            Self::Stream
        }
    }
}

#[derive(Debug)]
pub enum Rendered<'a, P> {
    Stream(WordStream<'a, P>),
    Block(&'a str),
}

#[derive(Debug, Clone, Copy)]
pub struct StreamingRenderer {
    delay: Duration,
}

impl Default for StreamingRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_DELAY)
    }
}

impl StreamingRenderer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    pub fn stream<'a, P: Pacer>(&self, text: &'a str, pacer: P) -> WordStream<'a, P> {
        WordStream {
            words: text.split_whitespace(),
            pacer,
            delay: self.delay,
            emitted: 0,
        }
    }

    pub fn render<'a, P: Pacer>(
        &self,
        text: &'a str,
        mode: RenderMode,
        pacer: P,
    ) -> Rendered<'a, P> {
        match mode {
            RenderMode::Stream => Rendered::Stream(self.stream(text, pacer)),
            RenderMode::Block => Rendered::Block(text),
        }
    }
}
