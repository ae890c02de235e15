use thiserror::Error;

/// Fallo de la búsqueda externa o de la extracción del stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("no se encontraron resultados para `{0}`")]
    NoResults(String),

    #[error("yt-dlp falló para `{query}`: {reason}")]
    Lookup { query: String, reason: String },

    #[error("respuesta de yt-dlp inválida: {0}")]
    Parse(String),

    #[error("no hay URL de stream para `{0}`")]
    MissingStream(String),
}

/// Fallo del sink de voz o al abrir el audio.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlaybackError {
    #[error("no se pudo abrir el stream: {0}")]
    Open(String),

    #[error("no hay conexión de voz en este servidor")]
    NotConnected,

    #[error("no hay ninguna pista activa")]
    NoActiveTrack,

    #[error("error del driver de voz: {0}")]
    Driver(String),
}

/// Error al preparar una fuente; en el precargado se descarta sin avisar al usuario.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum VoiceConnectionError {
    #[error("Songbird no inicializado")]
    NotInitialized,

    #[error("no se pudo conectar al canal de voz: {0}")]
    Join(String),

    #[error("no se pudo salir del canal de voz: {0}")]
    Leave(String),
}

/// Errores visibles para los comandos del usuario.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MusicError {
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Playback(#[from] PlaybackError),

    #[error(transparent)]
    Voice(#[from] VoiceConnectionError),

    #[error("la cola está llena (máximo {0} canciones)")]
    QueueFull(usize),

    #[error("posición inválida: {position} (la cola tiene {len} canciones)")]
    InvalidPosition { position: usize, len: usize },

    #[error("no hay ninguna canción sonando")]
    NothingPlaying,

    #[error("no hay ninguna canción pausada")]
    NothingPaused,

    #[error("la cola está vacía")]
    EmptyQueue,
}

pub type MusicResult<T> = std::result::Result<T, MusicError>;
