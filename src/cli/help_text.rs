pub(super) const ROOT_LONG_ABOUT: &str = "\
Incremental backups as a chain of dated full snapshots

Backchain copies a source directory into a new dated directory (a generation)
inside a target directory. After a completed run the newest generation is a
browsable copy of the source. Files that did not change since the previous
run are moved out of the previous generation instead of being copied again,
so the previous generation shrinks to exactly the files that changed or were
deleted since.

A run killed while moving files can leave some of them behind in an older
generation. Later runs then log them as failures until they change in the
source. Check the error log after an interrupted run.

CORE CONCEPTS:

  Generations:
    Directories named after the time of the run, using the format chosen by
    --type (for example 2024-06-01 for daily backups). A run in the same period
    as the previous one continues that generation.

  Chain configuration:
    backchain.json in the target directory records the source, the time
    format, the change detection method and the most recent generation.
    Later runs only need the target directory.

  Index files:
    <generation>.index next to each generation lists a fingerprint for every
    file. Missing or damaged index files are rebuilt from the generation.

TYPICAL WORKFLOW:

  1. Start a chain:
     $ backchain --source /home/me --type daily /mnt/backup

  2. Run again later, for example from cron:
     $ backchain /mnt/backup

CHANGE DETECTION:

  modsize (default)
    Modification time and size. Fast; misses edits that keep both.

  sha256
    Content hash. Reads every file on every run.

EXIT STATUS:

  0 on success, also when single files could not be copied (they are logged).
  11 when the previous generation named in the chain is missing.
  14 when no --type was given for the first backup.
  15 for invalid configuration, 16/17 when backchain.json cannot be read or
  written. Other codes identify the step that failed.
";
