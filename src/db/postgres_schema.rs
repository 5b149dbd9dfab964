pub const POSTGRES_SCHEMA: &str = r#"
-- PostgreSQL schema for LazyFood

CREATE TABLE IF NOT EXISTS ingrediente (
    id BIGSERIAL PRIMARY KEY,
    nombre VARCHAR(100) NOT NULL,
    categoria VARCHAR(50),
    unidad VARCHAR(20),
    emoji VARCHAR(8)
);

CREATE INDEX IF NOT EXISTS idx_ingrediente_categoria ON ingrediente(categoria);
CREATE INDEX IF NOT EXISTS idx_ingrediente_nombre ON ingrediente(LOWER(nombre));

CREATE TABLE IF NOT EXISTS receta (
    id BIGSERIAL PRIMARY KEY,
    nombre VARCHAR(200) NOT NULL,
    tiempo_preparacion INTEGER,
    calorias INTEGER,
    nivel_dificultad INTEGER DEFAULT 1,
    emoji VARCHAR(8),
    imagen_url TEXT
);

CREATE INDEX IF NOT EXISTS idx_receta_nombre ON receta(nombre);

CREATE TABLE IF NOT EXISTS usuario (
    id BIGSERIAL PRIMARY KEY,
    nombre VARCHAR(100) NOT NULL,
    correo VARCHAR(150) NOT NULL UNIQUE,
    password VARCHAR(255) NOT NULL,
    pais VARCHAR(50),
    fecha_creacion TIMESTAMP DEFAULT (NOW() AT TIME ZONE 'utc'),
    nivel_cocina INTEGER DEFAULT 1,
    metas_nutricionales VARCHAR(100),
    activo BOOLEAN NOT NULL DEFAULT TRUE,
    reset_token VARCHAR(255),
    reset_token_expiration TIMESTAMP
);

CREATE TABLE IF NOT EXISTS preferencia (
    id BIGSERIAL PRIMARY KEY,
    usuario_id BIGINT NOT NULL UNIQUE,
    dieta VARCHAR(50),
    alergias JSONB,
    gustos JSONB,
    FOREIGN KEY (usuario_id) REFERENCES usuario(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS inventario (
    id BIGSERIAL PRIMARY KEY,
    usuario_id BIGINT NOT NULL,
    ingrediente_id BIGINT NOT NULL,
    cantidad DOUBLE PRECISION,
    confianza DOUBLE PRECISION DEFAULT 1.0,
    fecha_actualizacion TIMESTAMP DEFAULT (NOW() AT TIME ZONE 'utc'),
    bounding_box JSONB,
    CONSTRAINT uq_usuario_ingrediente UNIQUE (usuario_id, ingrediente_id),
    FOREIGN KEY (usuario_id) REFERENCES usuario(id) ON DELETE CASCADE,
    FOREIGN KEY (ingrediente_id) REFERENCES ingrediente(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_inventario_usuario ON inventario(usuario_id);

CREATE TABLE IF NOT EXISTS paso_receta (
    id BIGSERIAL PRIMARY KEY,
    receta_id BIGINT NOT NULL,
    numero_paso INTEGER NOT NULL,
    instruccion TEXT NOT NULL,
    temporizador_segundos INTEGER,
    CONSTRAINT uq_receta_paso UNIQUE (receta_id, numero_paso),
    FOREIGN KEY (receta_id) REFERENCES receta(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_paso_receta_receta ON paso_receta(receta_id);

CREATE TABLE IF NOT EXISTS sugerencia_receta (
    id BIGSERIAL PRIMARY KEY,
    usuario_id BIGINT NOT NULL,
    receta_id BIGINT NOT NULL,
    porcentaje_coincidencia DOUBLE PRECISION,
    fecha TIMESTAMP DEFAULT (NOW() AT TIME ZONE 'utc'),
    FOREIGN KEY (usuario_id) REFERENCES usuario(id) ON DELETE CASCADE,
    FOREIGN KEY (receta_id) REFERENCES receta(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_sugerencia_usuario_fecha ON sugerencia_receta(usuario_id, fecha);

CREATE TABLE IF NOT EXISTS planificador (
    id BIGSERIAL PRIMARY KEY,
    usuario_id BIGINT NOT NULL,
    fecha DATE NOT NULL,
    tipo_comida VARCHAR(20) NOT NULL,
    receta_id BIGINT,
    es_sugerida BOOLEAN DEFAULT FALSE,
    CONSTRAINT uq_usuario_fecha_comida UNIQUE (usuario_id, fecha, tipo_comida),
    FOREIGN KEY (usuario_id) REFERENCES usuario(id) ON DELETE CASCADE,
    FOREIGN KEY (receta_id) REFERENCES receta(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_planificador_usuario_fecha ON planificador(usuario_id, fecha);

CREATE TABLE IF NOT EXISTS token (
    id BIGSERIAL PRIMARY KEY,
    usuario_id BIGINT NOT NULL,
    jwt TEXT NOT NULL,
    fecha_expiracion TIMESTAMP NOT NULL,
    FOREIGN KEY (usuario_id) REFERENCES usuario(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_token_usuario ON token(usuario_id);
"#;

pub const POSTGRES_ADD_ROL_COLUMN: &str =
    "ALTER TABLE usuario ADD COLUMN rol VARCHAR(20) NOT NULL DEFAULT 'user'";
