mod bulk;
mod coll;
mod csot;
mod cursor;
mod pool;
