/*!

This is the long-form manual for `open_poll` and the `openpoll` command line program.

## Lifecycle

A poll is either **active** (accepting responses) or **closed**. It starts active.

| Operation | Who | Allowed when |
|-----------|-----|--------------|
| create    | admin | always (non-blank question) |
| submit    | anyone with the code | active |
| close     | admin | active |
| reopen    | admin | closed |
| edit      | admin | active |
| delete    | admin | always |

Closing a poll computes its aggregate:
- `wordFrequencies`: the terms used at least twice across all responses, most frequent
  first, at most 50 of them. Words of one or two letters and common English words
  (see [`crate::STOP_WORDS`]) are ignored, as well as punctuation and case.
- `summaryText`: a narrative summary from the configured summary provider. If the
  provider fails, the poll still closes and the summary holds
  [`crate::SUMMARY_FAILED_PLACEHOLDER`].

Reopening a poll keeps the previous aggregate until the next close replaces it.

Closing twice, or reopening an active poll, is an error.

## Poll codes

Codes are 6 characters taken from `ABCDEFGHJKLMNPQRSTUVWXYZ23456789`. The characters
`0`, `1`, `I` and `O` are left out because they are easily confused. Respondents may
type a code in lowercase.

## Command line

```text
openpoll [--config FILE] [--store FILE] [--admin-password PASSWORD] [--verbose] <COMMAND>
```

The commands are:
* `create <QUESTION>` publishes a poll and prints it, with its code
* `list` lists all polls with their response counts
* `show <ID>` prints a poll with all its responses
* `lookup <CODE>` prints the public view of a poll
* `submit <CODE> <TEXT>` records a response
* `close <ID>`, `reopen <ID>`
* `edit <ID> <QUESTION>`
* `delete <ID>`
* `export <ID> [--out FILE]` writes the responses and the ranked terms of a poll as CSV
* `aggregate --input FILE` ranks the terms of a text file, one response per line,
  without touching the store

All the commands but `lookup`, `submit` and `aggregate` require the admin password.
Results are printed as JSON on the standard output.

### Example

```bash
export ADMIN_PASSWORD=letmein
openpoll --admin-password letmein create "What should we improve first?"
openpoll submit K7QX2M "The onboarding documentation"
openpoll submit K7QX2M "Documentation and the build times"
openpoll --admin-password letmein close 5b0c2c7e-3d0a-4a38-9a52-5a1f0b1f9d11
```

## Configuration

`openpoll` comes with sensible defaults. A configuration file in JSON can be passed
with `--config`:

```json
{
  "store": "polls.json",
  "adminPassword": "letmein",
  "aggregation": {
    "minCount": 2,
    "maxTerms": 50,
    "tiebreakMode": "alphabetical"
  },
  "summary": {
    "provider": "http",
    "endpoint": "http://localhost:8080/summarize",
    "apiKey": "...",
    "timeoutSecs": 10
  }
}
```

All the fields are optional.
 - `store` (string): the JSON file holding the polls and responses. Defaults to `polls.json`.
   The `--store` flag takes precedence.
 - `adminPassword` (string): the admin password. The `ADMIN_PASSWORD` environment
   variable takes precedence. Without a password, admin commands are refused.
 - `aggregation.minCount` (number): minimum number of occurrences for a term to be ranked.
 - `aggregation.maxTerms` (number): size of the ranking.
 - `aggregation.tiebreakMode` (`alphabetical` or `firstSeen`): order of the terms with the
   same count.
 - `summary.provider`:
   - `statistical` (default) describes the responses with simple statistics and samples;
   - `http` posts `{"question": ..., "responses": [...]}` to `summary.endpoint` and expects
     `{"summary": ...}` back;
   - `none` stores a fixed text.
 - `summary.timeoutSecs` (number): deadline for one summary. An expired summary is
   treated like a failed one.

 */
