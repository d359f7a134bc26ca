use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OpenFlags};

use crate::error::SchemaError;
use crate::matcher::Recipe;
use crate::schema::SchemaDescriptor;

// ---------------------------------------------------------------------------
// Input structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct NewIngredient {
    pub name: String,
    pub quantity: Option<String>,
    pub unit: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewRecipe {
    pub name: String,
    pub description: Option<String>,
    pub instructions: String,
    pub prep_time: Option<i64>,
    pub cook_time: Option<i64>,
    pub servings: Option<i64>,
    pub difficulty: Option<String>,
    pub cuisine_type: Option<String>,
    pub url: Option<String>,
    pub ingredients: Vec<NewIngredient>,
}

// ---------------------------------------------------------------------------
// Database
// ---------------------------------------------------------------------------

/// Read-write handle used to create, migrate and seed the recipe database,
/// and for the catalog reads behind ingredient and name search. Generated
/// queries never run through this handle; see `executor::SqliteExecutor`.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) a SQLite database at `path` and run migrations.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;
        let db = Self { conn };
        db.apply_pragmas()?;
        db.migrate()?;
        Ok(db)
    }

    /// Open an existing database without write access, for per-request
    /// catalog reads. No migrations run.
    pub fn open_read_only(path: &str, busy_timeout: Duration) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .with_context(|| format!("failed to open database at {path} read-only"))?;
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA query_only = ON;")?;
        Ok(Self { conn })
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .context("failed to open in-memory database")?;
        let db = Self { conn };
        db.apply_pragmas()?;
        db.migrate()?;
        Ok(db)
    }

    fn apply_pragmas(&self) -> Result<()> {
        self.conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        Ok(())
    }

    /// Execute `f` inside an IMMEDIATE transaction. Commits on Ok, rolls back on Err.
    pub fn with_transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        self.conn.execute_batch("BEGIN IMMEDIATE")?;
        match f() {
            Ok(val) => {
                self.conn.execute_batch("COMMIT")?;
                Ok(val)
            }
            Err(e) => {
                let _ = self.conn.execute_batch("ROLLBACK");
                Err(e)
            }
        }
    }

    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id   INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS recipes (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                name         TEXT NOT NULL,
                description  TEXT,
                instructions TEXT NOT NULL,
                prep_time    INTEGER,
                cook_time    INTEGER,
                servings     INTEGER,
                difficulty   TEXT CHECK(difficulty IN ('easy', 'medium', 'hard')),
                cuisine_type TEXT,
                url          TEXT,
                created_at   TIMESTAMP DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS ingredients (
                id       INTEGER PRIMARY KEY AUTOINCREMENT,
                name     TEXT NOT NULL UNIQUE,
                category TEXT
            );

            CREATE TABLE IF NOT EXISTS recipe_ingredients (
                id            INTEGER PRIMARY KEY AUTOINCREMENT,
                recipe_id     INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                ingredient_id INTEGER NOT NULL REFERENCES ingredients(id) ON DELETE CASCADE,
                quantity      TEXT,
                unit          TEXT,
                notes         TEXT,
                UNIQUE(recipe_id, ingredient_id)
            );

            CREATE TABLE IF NOT EXISTS starred_recipes (
                id         INTEGER PRIMARY KEY AUTOINCREMENT,
                recipe_id  INTEGER NOT NULL REFERENCES recipes(id) ON DELETE CASCADE,
                user_id    INTEGER DEFAULT 1 REFERENCES users(id) ON DELETE CASCADE,
                starred_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                UNIQUE(recipe_id, user_id)
            );

            -- Indexes
            CREATE INDEX IF NOT EXISTS idx_recipe_name                  ON recipes(name);
            CREATE INDEX IF NOT EXISTS idx_ingredient_name              ON ingredients(name);
            CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_recipe     ON recipe_ingredients(recipe_id);
            CREATE INDEX IF NOT EXISTS idx_recipe_ingredients_ingredient ON recipe_ingredients(ingredient_id);
            CREATE INDEX IF NOT EXISTS idx_starred_recipes_user         ON starred_recipes(user_id);
            ",
        )?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Recipe writes
    // -----------------------------------------------------------------------

    /// Insert a recipe and link its ingredients, creating ingredient rows on
    /// first use. Returns the new recipe id.
    pub fn insert_recipe(&self, recipe: &NewRecipe) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO recipes (name, description, instructions, prep_time, cook_time,
                                  servings, difficulty, cuisine_type, url)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                recipe.name,
                recipe.description,
                recipe.instructions,
                recipe.prep_time,
                recipe.cook_time,
                recipe.servings,
                recipe.difficulty,
                recipe.cuisine_type,
                recipe.url,
            ],
        )?;
        let recipe_id = self.conn.last_insert_rowid();

        for ingredient in &recipe.ingredients {
            let name = ingredient.name.trim().to_lowercase();
            self.conn.execute(
                "INSERT OR IGNORE INTO ingredients (name, category) VALUES (?1, ?2)",
                params![name, ingredient.category],
            )?;
            // INSERT OR IGNORE leaves last_insert_rowid stale when the row
            // already exists; always SELECT the id.
            let ingredient_id: i64 = self.conn.query_row(
                "SELECT id FROM ingredients WHERE name = ?1",
                params![name],
                |r| r.get(0),
            )?;
            self.conn.execute(
                "INSERT OR IGNORE INTO recipe_ingredients (recipe_id, ingredient_id, quantity, unit)
                 VALUES (?1, ?2, ?3, ?4)",
                params![recipe_id, ingredient_id, ingredient.quantity, ingredient.unit],
            )?;
        }

        Ok(recipe_id)
    }

    /// Load the sample recipes into an empty database. Returns how many were
    /// inserted (zero if the database already has recipes).
    pub fn seed_sample_recipes(&self) -> Result<usize> {
        if self.recipe_count()? > 0 {
            return Ok(0);
        }
        self.with_transaction(|| {
            let samples = sample_recipes();
            for recipe in &samples {
                self.insert_recipe(recipe)
                    .with_context(|| format!("failed to seed recipe '{}'", recipe.name))?;
            }
            Ok(samples.len())
        })
    }

    // -----------------------------------------------------------------------
    // Catalog reads
    // -----------------------------------------------------------------------

    /// Lock wait configured on this connection, in milliseconds.
    pub fn busy_timeout_ms(&self) -> Result<i64> {
        let ms = self
            .conn
            .query_row("PRAGMA busy_timeout", [], |row| row.get(0))?;
        Ok(ms)
    }

    pub fn recipe_count(&self) -> Result<i64> {
        let n = self
            .conn
            .query_row("SELECT COUNT(*) FROM recipes", [], |r| r.get(0))?;
        Ok(n)
    }

    /// Every recipe with its lower-cased ingredient names, ordered by name.
    pub fn all_recipes(&self) -> Result<Vec<Recipe>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, description, difficulty, cuisine_type,
                    prep_time, cook_time, servings, url
             FROM recipes
             ORDER BY name, id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Recipe {
                id: row.get(0)?,
                name: row.get(1)?,
                description: row.get(2)?,
                difficulty: row.get(3)?,
                cuisine_type: row.get(4)?,
                prep_time: row.get(5)?,
                cook_time: row.get(6)?,
                servings: row.get(7)?,
                url: row.get(8)?,
                ingredients: Vec::new(),
            })
        })?;
        let mut recipes = rows.collect::<std::result::Result<Vec<_>, _>>()?;

        let mut ingredients: HashMap<i64, Vec<String>> = HashMap::new();
        let mut stmt = self.conn.prepare(
            "SELECT ri.recipe_id, LOWER(i.name)
             FROM recipe_ingredients ri
             JOIN ingredients i ON ri.ingredient_id = i.id
             ORDER BY i.name",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)))?;
        for row in rows {
            let (recipe_id, name) = row?;
            ingredients.entry(recipe_id).or_default().push(name);
        }

        for recipe in &mut recipes {
            recipe.ingredients = ingredients.remove(&recipe.id).unwrap_or_default();
        }
        Ok(recipes)
    }

    // -----------------------------------------------------------------------
    // Introspection
    // -----------------------------------------------------------------------

    pub fn table_names(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT name FROM sqlite_master WHERE type = 'table'
             AND name NOT LIKE 'sqlite_%'
             ORDER BY name",
        )?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    fn column_names(&self, table: &str) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM pragma_table_info(?1)")?;
        let rows = stmt.query_map(params![table], |row| row.get::<_, String>(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Confirm every table and column in the registry exists in this
    /// database. A mismatch means generated queries would be judged against
    /// a schema the engine does not have.
    pub fn verify_schema(&self, schema: &SchemaDescriptor) -> Result<()> {
        for table in schema.tables() {
            let columns = self.column_names(&table.name)?;
            if columns.is_empty() {
                return Err(SchemaError::Drift(format!("table '{}'", table.name)).into());
            }
            for column in &table.columns {
                if !columns.iter().any(|c| c.eq_ignore_ascii_case(column)) {
                    return Err(SchemaError::Drift(format!(
                        "column '{}.{}'",
                        table.name, column
                    ))
                    .into());
                }
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Sample data
// ---------------------------------------------------------------------------

struct SampleRecipe {
    name: &'static str,
    description: &'static str,
    instructions: &'static str,
    prep_time: i64,
    cook_time: i64,
    servings: i64,
    difficulty: &'static str,
    cuisine_type: &'static str,
    /// (name, quantity, unit, category)
    ingredients: &'static [(&'static str, &'static str, &'static str, &'static str)],
}

const SAMPLES: &[SampleRecipe] = &[
    SampleRecipe {
        name: "Classic Spaghetti Carbonara",
        description: "Creamy Italian pasta dish with eggs, cheese, and pancetta",
        instructions: "1. Cook spaghetti according to package directions. 2. Fry pancetta until crispy. \
                       3. Mix eggs and parmesan. 4. Combine hot pasta with pancetta, then mix in egg mixture off heat. \
                       5. Season with black pepper and serve.",
        prep_time: 10,
        cook_time: 20,
        servings: 4,
        difficulty: "medium",
        cuisine_type: "Italian",
        ingredients: &[
            ("spaghetti", "400", "g", "pasta"),
            ("eggs", "4", "whole", "dairy"),
            ("parmesan cheese", "100", "g", "dairy"),
            ("pancetta", "150", "g", "meat"),
            ("black pepper", "1", "tsp", "spice"),
        ],
    },
    SampleRecipe {
        name: "Chicken Stir Fry",
        description: "Quick and healthy Asian-inspired chicken and vegetable stir fry",
        instructions: "1. Cut chicken into strips and marinate in soy sauce. 2. Heat oil in wok. \
                       3. Stir fry chicken until cooked. 4. Add vegetables and stir fry. 5. Add sauce and serve over rice.",
        prep_time: 15,
        cook_time: 15,
        servings: 4,
        difficulty: "easy",
        cuisine_type: "Asian",
        ingredients: &[
            ("chicken breast", "500", "g", "meat"),
            ("soy sauce", "3", "tbsp", "condiment"),
            ("bell peppers", "2", "whole", "vegetable"),
            ("onion", "1", "whole", "vegetable"),
            ("garlic", "3", "cloves", "vegetable"),
            ("ginger", "1", "tbsp", "spice"),
            ("vegetable oil", "2", "tbsp", "oil"),
            ("rice", "2", "cups", "grain"),
        ],
    },
    SampleRecipe {
        name: "Caprese Salad",
        description: "Simple Italian salad with tomatoes, mozzarella, and basil",
        instructions: "1. Slice tomatoes and mozzarella. 2. Arrange on plate alternating tomato and cheese. \
                       3. Add fresh basil leaves. 4. Drizzle with olive oil and balsamic vinegar. 5. Season with salt and pepper.",
        prep_time: 10,
        cook_time: 0,
        servings: 2,
        difficulty: "easy",
        cuisine_type: "Italian",
        ingredients: &[
            ("tomatoes", "4", "whole", "vegetable"),
            ("mozzarella cheese", "250", "g", "dairy"),
            ("fresh basil", "1", "bunch", "herb"),
            ("olive oil", "3", "tbsp", "oil"),
            ("balsamic vinegar", "2", "tbsp", "condiment"),
            ("salt", "1", "tsp", "spice"),
            ("black pepper", "1", "tsp", "spice"),
        ],
    },
    SampleRecipe {
        name: "Beef Tacos",
        description: "Mexican-style tacos with seasoned ground beef",
        instructions: "1. Brown ground beef in pan. 2. Add taco seasoning and water. 3. Simmer until thickened. \
                       4. Warm tortillas. 5. Assemble tacos with beef and toppings.",
        prep_time: 10,
        cook_time: 15,
        servings: 4,
        difficulty: "easy",
        cuisine_type: "Mexican",
        ingredients: &[
            ("ground beef", "500", "g", "meat"),
            ("taco seasoning", "2", "tbsp", "spice"),
            ("tortillas", "8", "whole", "grain"),
            ("lettuce", "1", "cup", "vegetable"),
            ("tomatoes", "2", "whole", "vegetable"),
            ("cheddar cheese", "200", "g", "dairy"),
            ("sour cream", "1", "cup", "dairy"),
        ],
    },
    SampleRecipe {
        name: "Mushroom Risotto",
        description: "Creamy Italian rice dish with mushrooms and parmesan",
        instructions: "1. Sauté mushrooms and set aside. 2. Toast rice in butter. 3. Add wine and let absorb. \
                       4. Gradually add warm broth, stirring constantly. 5. Stir in mushrooms, butter, and parmesan. \
                       6. Season and serve.",
        prep_time: 15,
        cook_time: 30,
        servings: 4,
        difficulty: "hard",
        cuisine_type: "Italian",
        ingredients: &[
            ("arborio rice", "300", "g", "grain"),
            ("mushrooms", "400", "g", "vegetable"),
            ("chicken broth", "1", "liter", "liquid"),
            ("white wine", "150", "ml", "liquid"),
            ("onion", "1", "whole", "vegetable"),
            ("garlic", "2", "cloves", "vegetable"),
            ("parmesan cheese", "100", "g", "dairy"),
            ("butter", "50", "g", "dairy"),
            ("olive oil", "2", "tbsp", "oil"),
        ],
    },
];

fn sample_recipes() -> Vec<NewRecipe> {
    SAMPLES
        .iter()
        .map(|s| NewRecipe {
            name: s.name.to_string(),
            description: Some(s.description.to_string()),
            instructions: s.instructions.to_string(),
            prep_time: Some(s.prep_time),
            cook_time: Some(s.cook_time),
            servings: Some(s.servings),
            difficulty: Some(s.difficulty.to_string()),
            cuisine_type: Some(s.cuisine_type.to_string()),
            url: None,
            ingredients: s
                .ingredients
                .iter()
                .map(|(name, quantity, unit, category)| NewIngredient {
                    name: name.to_string(),
                    quantity: Some(quantity.to_string()),
                    unit: Some(unit.to_string()),
                    category: Some(category.to_string()),
                })
                .collect(),
        })
        .collect()
}
