/// Tables in creation order: lookups first, then `usuario`, then everything
/// that references it. Deletion and copying follow the same order (reversed
/// for deletion).
pub const TABLE_ORDER: &[&str] = &[
    "ingrediente",
    "receta",
    "usuario",
    "preferencia",
    "inventario",
    "paso_receta",
    "sugerencia_receta",
    "planificador",
    "token",
];

/// Base schema. `usuario.rol` is deliberately absent; it is added by the
/// `rol` migration so that databases created before the column existed and
/// fresh ones converge on the same shape.
pub const SCHEMA: &str = r#"
-- Ingredient lookup
CREATE TABLE IF NOT EXISTS ingrediente (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    nombre TEXT NOT NULL,
    categoria TEXT,
    unidad TEXT,
    emoji TEXT
);

CREATE INDEX IF NOT EXISTS idx_ingrediente_categoria ON ingrediente(categoria);
CREATE INDEX IF NOT EXISTS idx_ingrediente_nombre ON ingrediente(nombre COLLATE NOCASE);

-- Recipe lookup
CREATE TABLE IF NOT EXISTS receta (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    nombre TEXT NOT NULL,
    tiempo_preparacion INTEGER,      -- minutes
    calorias INTEGER,                -- per serving
    nivel_dificultad INTEGER DEFAULT 1,  -- 1 easy, 2 medium, 3 hard
    emoji TEXT,
    imagen_url TEXT
);

CREATE INDEX IF NOT EXISTS idx_receta_nombre ON receta(nombre);

-- Users: the single owning entity
CREATE TABLE IF NOT EXISTS usuario (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    nombre TEXT NOT NULL,
    correo TEXT NOT NULL UNIQUE,
    password TEXT NOT NULL,
    pais TEXT,
    fecha_creacion TEXT DEFAULT CURRENT_TIMESTAMP,
    nivel_cocina INTEGER DEFAULT 1,  -- 1 beginner, 2 intermediate, 3 advanced
    metas_nutricionales TEXT,
    activo INTEGER NOT NULL DEFAULT 1,
    reset_token TEXT,
    reset_token_expiration TEXT
);

-- One preference row per user
CREATE TABLE IF NOT EXISTS preferencia (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    usuario_id INTEGER NOT NULL UNIQUE,
    dieta TEXT,
    alergias TEXT,  -- JSON array
    gustos TEXT,    -- JSON array
    FOREIGN KEY (usuario_id) REFERENCES usuario(id) ON DELETE CASCADE
);

-- Per-user pantry
CREATE TABLE IF NOT EXISTS inventario (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    usuario_id INTEGER NOT NULL,
    ingrediente_id INTEGER NOT NULL,
    cantidad REAL,
    confianza REAL DEFAULT 1.0,      -- detection confidence (0-1)
    fecha_actualizacion TEXT DEFAULT CURRENT_TIMESTAMP,
    bounding_box TEXT,               -- JSON {x, y, width, height}
    CONSTRAINT uq_usuario_ingrediente UNIQUE (usuario_id, ingrediente_id),
    FOREIGN KEY (usuario_id) REFERENCES usuario(id) ON DELETE CASCADE,
    FOREIGN KEY (ingrediente_id) REFERENCES ingrediente(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_inventario_usuario ON inventario(usuario_id);

-- Ordered recipe steps
CREATE TABLE IF NOT EXISTS paso_receta (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    receta_id INTEGER NOT NULL,
    numero_paso INTEGER NOT NULL,
    instruccion TEXT NOT NULL,
    temporizador_segundos INTEGER,
    CONSTRAINT uq_receta_paso UNIQUE (receta_id, numero_paso),
    FOREIGN KEY (receta_id) REFERENCES receta(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_paso_receta_receta ON paso_receta(receta_id);

-- Append-only history of match scores
CREATE TABLE IF NOT EXISTS sugerencia_receta (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    usuario_id INTEGER NOT NULL,
    receta_id INTEGER NOT NULL,
    porcentaje_coincidencia REAL,    -- 0.00 to 100.00
    fecha TEXT DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (usuario_id) REFERENCES usuario(id) ON DELETE CASCADE,
    FOREIGN KEY (receta_id) REFERENCES receta(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_sugerencia_usuario_fecha ON sugerencia_receta(usuario_id, fecha);

-- Meal planner: one recipe per user, day and meal
CREATE TABLE IF NOT EXISTS planificador (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    usuario_id INTEGER NOT NULL,
    fecha TEXT NOT NULL,             -- YYYY-MM-DD
    tipo_comida TEXT NOT NULL,       -- 'desayuno', 'almuerzo', 'cena'
    receta_id INTEGER,
    es_sugerida INTEGER DEFAULT 0,
    CONSTRAINT uq_usuario_fecha_comida UNIQUE (usuario_id, fecha, tipo_comida),
    FOREIGN KEY (usuario_id) REFERENCES usuario(id) ON DELETE CASCADE,
    FOREIGN KEY (receta_id) REFERENCES receta(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_planificador_usuario_fecha ON planificador(usuario_id, fecha);

-- Issued session tokens
CREATE TABLE IF NOT EXISTS token (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    usuario_id INTEGER NOT NULL,
    jwt TEXT NOT NULL,
    fecha_expiracion TEXT NOT NULL,
    FOREIGN KEY (usuario_id) REFERENCES usuario(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_token_usuario ON token(usuario_id);
"#;

/// Column added by the `rol` migration (SQLite dialect).
pub const ADD_ROL_COLUMN: &str =
    "ALTER TABLE usuario ADD COLUMN rol TEXT NOT NULL DEFAULT 'user'";
